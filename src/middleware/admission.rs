//! Admission control
//!
//! Global and per-source-address limits on concurrent control connections.
//! A slot is held by an [`AdmissionGuard`] for as long as the connection task
//! runs and released when the guard drops.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, PoisonError};

/// Why a connection was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    ServerFull,
    TooManyFromAddress,
}

#[derive(Debug, Default)]
struct Counts {
    total: usize,
    per_ip: HashMap<IpAddr, usize>,
}

#[derive(Debug, Clone)]
pub struct ConnectionLimiter {
    counts: Arc<Mutex<Counts>>,
    max_total: usize,
    max_per_ip: usize,
}

impl ConnectionLimiter {
    pub fn new(max_total: usize, max_per_ip: usize) -> Self {
        Self {
            counts: Arc::new(Mutex::new(Counts::default())),
            max_total,
            max_per_ip,
        }
    }

    pub fn try_acquire(&self, ip: IpAddr) -> Result<AdmissionGuard, Refusal> {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);

        if counts.total >= self.max_total {
            return Err(Refusal::ServerFull);
        }
        let from_ip = counts.per_ip.get(&ip).copied().unwrap_or(0);
        if from_ip >= self.max_per_ip {
            return Err(Refusal::TooManyFromAddress);
        }

        counts.total += 1;
        counts.per_ip.insert(ip, from_ip + 1);

        Ok(AdmissionGuard {
            counts: Arc::clone(&self.counts),
            ip,
        })
    }

    /// Connections currently admitted
    pub fn active(&self) -> usize {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .total
    }
}

/// Holds one admitted connection's slot
#[derive(Debug)]
pub struct AdmissionGuard {
    counts: Arc<Mutex<Counts>>,
    ip: IpAddr,
}

impl Drop for AdmissionGuard {
    fn drop(&mut self) {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        counts.total = counts.total.saturating_sub(1);
        if let Some(n) = counts.per_ip.get_mut(&self.ip) {
            *n -= 1;
            if *n == 0 {
                counts.per_ip.remove(&self.ip);
            }
        }
    }
}
