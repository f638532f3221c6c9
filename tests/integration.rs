use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use ftp_engine::client::{ClientState, FtpClient};
use ftp_engine::config::UserConfig;
use ftp_engine::error::ClientError;
use ftp_engine::protocol::{Command, Reply, ReplyReader, ReplyWriter, Verb};
use ftp_engine::storage::TEMP_PREFIX;
use ftp_engine::transfer::{TransferMode, parse_passive_reply};
use ftp_engine::{Server, ServerConfig};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;

// Helper to start a server on an ephemeral port rooted in a fresh temp dir
async fn start_server(tweak: impl FnOnce(&mut ServerConfig)) -> (SocketAddr, TempDir) {
    let root = tempfile::tempdir().unwrap();

    let mut users = HashMap::new();
    users.insert(
        "alice".to_string(),
        UserConfig {
            password: "secret".to_string(),
            perms: "elradmw".to_string(),
        },
    );
    users.insert(
        "guest".to_string(),
        UserConfig {
            password: "guest".to_string(),
            perms: "elr".to_string(),
        },
    );

    let mut config = ServerConfig {
        bind_address: "127.0.0.1".to_string(),
        control_port: 0,
        server_root: root.path().display().to_string(),
        users,
        ..ServerConfig::default()
    };
    tweak(&mut config);

    let server = Server::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    (addr, root)
}

async fn login(addr: SocketAddr, user: &str, password: &str) -> FtpClient {
    let mut client = FtpClient::connect(addr).await.unwrap();
    client.login(user, password).await.unwrap();
    client
}

fn reply_code(err: ClientError) -> u16 {
    match err {
        ClientError::UnexpectedReply { code, .. } => code,
        other => panic!("expected an FTP reply error, got {other:?}"),
    }
}

// Bare control connection, for reply sequences FtpClient does not expose
struct Control {
    replies: ReplyReader<OwnedReadHalf>,
    commands: ReplyWriter<OwnedWriteHalf>,
}

impl Control {
    async fn login(addr: SocketAddr) -> Self {
        let (read_half, write_half) = TcpStream::connect(addr).await.unwrap().into_split();
        let mut control = Self {
            replies: ReplyReader::new(read_half, 8192),
            commands: ReplyWriter::new(write_half),
        };
        assert_eq!(control.reply().await.code(), 220);
        assert_eq!(control.send(Verb::User, "alice").await.code(), 331);
        assert_eq!(control.send(Verb::Pass, "secret").await.code(), 230);
        control
    }

    async fn reply(&mut self) -> Reply {
        self.replies.next_reply().await.unwrap()
    }

    async fn send(&mut self, verb: Verb, arg: &str) -> Reply {
        self.commands.send_command(&Command::new(verb, arg)).await.unwrap();
        self.reply().await
    }

    // PASV, then open the data connection
    async fn passive(&mut self) -> TcpStream {
        let reply = self.send(Verb::Pasv, "").await;
        assert_eq!(reply.code(), 227);
        let addr = parse_passive_reply(reply.text()).unwrap();
        TcpStream::connect(SocketAddr::V4(addr)).await.unwrap()
    }
}

fn upload_temporaries(root: &Path) -> Vec<String> {
    std::fs::read_dir(root)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(TEMP_PREFIX))
        .collect()
}

async fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if done() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    done()
}

#[tokio::test]
async fn test_greeting_and_login() {
    let (addr, _root) = start_server(|c| c.banner = "Welcome\nSecond line".to_string()).await;

    let mut client = FtpClient::connect(addr).await.unwrap();
    assert_eq!(client.greeting().code(), 220);
    assert_eq!(client.greeting().text(), "Welcome");
    assert_eq!(client.greeting().continuation(), ["Second line", "Service ready"]);
    assert_eq!(client.state(), ClientState::Connected);

    client.login("alice", "secret").await.unwrap();
    assert_eq!(client.state(), ClientState::LoggedIn);
    assert_eq!(client.pwd().await.unwrap(), "/");
    client.quit().await.unwrap();
}

#[tokio::test]
async fn test_commands_before_login_are_rejected() {
    let (addr, _root) = start_server(|_| {}).await;
    let mut client = FtpClient::connect(addr).await.unwrap();

    for verb in [Verb::Pwd, Verb::Pasv, Verb::Syst] {
        let reply = client.command(verb, "").await.unwrap();
        assert_eq!(reply.code(), 530);
    }
    let reply = client.command(Verb::Retr, "file.txt").await.unwrap();
    assert_eq!(reply.code(), 530);

    // PASS without USER is a sequence error
    let reply = client.command(Verb::Pass, "secret").await.unwrap();
    assert_eq!(reply.code(), 503);
}

#[tokio::test]
async fn test_wrong_password_then_lockout() {
    let (addr, _root) = start_server(|c| c.max_login_attempts = 2).await;
    let mut client = FtpClient::connect(addr).await.unwrap();

    let err = client.login("alice", "wrong").await.unwrap_err();
    assert_eq!(reply_code(err), 530);

    let err = client.login("ALICE", "wrong").await.unwrap_err();
    assert_eq!(reply_code(err), 421);

    // The server hung up after the 421
    assert!(client.noop().await.is_err());
}

#[tokio::test]
async fn test_store_and_retrieve_round_trip() {
    let (addr, root) = start_server(|c| c.buffer_size = 1024).await;
    let mut client = login(addr, "alice", "secret").await;

    let cases: [(&str, Vec<u8>); 3] = [
        ("empty.bin", Vec::new()),
        ("one.bin", vec![0x42]),
        ("large.bin", (0..100_000u32).map(|i| (i % 251) as u8).collect()),
    ];

    for (name, data) in &cases {
        let sent = client.store(name, &mut data.as_slice()).await.unwrap();
        assert_eq!(sent, data.len() as u64);
        assert_eq!(&std::fs::read(root.path().join(name)).unwrap(), data);

        let received = client.retrieve(name).await.unwrap();
        assert_eq!(&received, data);
    }

    // STOR replaces an existing file
    client.store("one.bin", &mut &b"replaced"[..]).await.unwrap();
    assert_eq!(client.retrieve("one.bin").await.unwrap(), b"replaced");
}

#[tokio::test]
async fn test_restart_offset_on_retrieve() {
    let (addr, root) = start_server(|_| {}).await;
    std::fs::write(root.path().join("digits.txt"), b"0123456789").unwrap();
    let mut client = login(addr, "alice", "secret").await;

    let reply = client.command(Verb::Rest, "4").await.unwrap();
    assert_eq!(reply.code(), 350);
    assert_eq!(client.retrieve("digits.txt").await.unwrap(), b"456789");

    // The offset applies to one transfer only
    assert_eq!(client.retrieve("digits.txt").await.unwrap(), b"0123456789");
}

#[tokio::test]
async fn test_listing_and_directories() {
    let (addr, root) = start_server(|_| {}).await;
    std::fs::write(root.path().join("readme.txt"), b"hello").unwrap();
    let mut client = login(addr, "alice", "secret").await;

    assert_eq!(client.make_dir("docs").await.unwrap(), "/docs");
    client.cwd("docs").await.unwrap();
    assert_eq!(client.pwd().await.unwrap(), "/docs");
    client.store("inner.txt", &mut &b"abc"[..]).await.unwrap();
    client.cdup().await.unwrap();
    assert_eq!(client.pwd().await.unwrap(), "/");

    let entries = client.list_entries(None).await.unwrap();
    let readme = entries.iter().find(|e| e.name == "readme.txt").unwrap();
    assert_eq!(readme.size, Some(5));
    assert!(!readme.is_dir());
    assert!(entries.iter().any(|e| e.name == "docs" && e.is_dir()));

    let lines = client.list(Some("-la docs")).await.unwrap();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].ends_with("inner.txt"));
}

#[tokio::test]
async fn test_remove_dir_only_when_empty() {
    let (addr, root) = start_server(|_| {}).await;
    std::fs::create_dir(root.path().join("full")).unwrap();
    std::fs::write(root.path().join("full/file.txt"), b"x").unwrap();
    std::fs::create_dir(root.path().join("empty")).unwrap();
    let mut client = login(addr, "alice", "secret").await;

    let err = client.remove_dir("full").await.unwrap_err();
    assert_eq!(reply_code(err), 550);
    assert!(root.path().join("full/file.txt").exists());

    client.remove_dir("empty").await.unwrap();
    assert!(!root.path().join("empty").exists());
    let names: Vec<_> = client
        .list_entries(None)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, ["full"]);

    client.delete("full/file.txt").await.unwrap();
    client.remove_dir("full").await.unwrap();

    let err = client.delete("missing.txt").await.unwrap_err();
    assert_eq!(reply_code(err), 550);
}

#[tokio::test]
async fn test_paths_cannot_escape_root() {
    let (addr, root) = start_server(|_| {}).await;
    let mut client = login(addr, "alice", "secret").await;

    let err = client.cwd("../..").await.unwrap_err();
    assert_eq!(reply_code(err), 550);
    let err = client.retrieve("../../etc/passwd").await.unwrap_err();
    assert_eq!(reply_code(err), 550);
    let err = client.cdup().await.unwrap_err();
    assert_eq!(reply_code(err), 550);
    assert_eq!(client.pwd().await.unwrap(), "/");

    #[cfg(unix)]
    {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), b"nope").unwrap();
        std::os::unix::fs::symlink(outside.path(), root.path().join("link")).unwrap();

        let err = client.cwd("link").await.unwrap_err();
        assert_eq!(reply_code(err), 550);
        let err = client.retrieve("link/secret.txt").await.unwrap_err();
        assert_eq!(reply_code(err), 550);
    }
}

#[tokio::test]
async fn test_permissions_are_enforced() {
    let (addr, root) = start_server(|_| {}).await;
    std::fs::write(root.path().join("public.txt"), b"read me").unwrap();
    let mut client = login(addr, "guest", "guest").await;

    assert_eq!(client.retrieve("public.txt").await.unwrap(), b"read me");

    let err = client.store("upload.txt", &mut &b"data"[..]).await.unwrap_err();
    assert_eq!(reply_code(err), 550);
    assert!(!root.path().join("upload.txt").exists());

    let err = client.delete("public.txt").await.unwrap_err();
    assert_eq!(reply_code(err), 550);
}

#[tokio::test]
async fn test_transfer_without_data_endpoint() {
    let (addr, root) = start_server(|_| {}).await;
    std::fs::write(root.path().join("a.txt"), b"a").unwrap();
    let mut client = login(addr, "alice", "secret").await;

    let reply = client.command(Verb::Retr, "a.txt").await.unwrap();
    assert_eq!(reply.code(), 425);
    let reply = client.command(Verb::List, "").await.unwrap();
    assert_eq!(reply.code(), 425);
}

#[tokio::test]
async fn test_second_pasv_replaces_first() {
    let (addr, _root) = start_server(|_| {}).await;
    let mut client = login(addr, "alice", "secret").await;

    let first = client.command(Verb::Pasv, "").await.unwrap();
    assert_eq!(first.code(), 227);
    let first = parse_passive_reply(first.text()).unwrap();

    let second = client.command(Verb::Pasv, "").await.unwrap();
    assert_eq!(second.code(), 227);

    // The first listener is gone
    assert!(TcpStream::connect(SocketAddr::V4(first)).await.is_err());

    // and the session still transfers normally
    assert!(client.list(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_active_mode_transfers() {
    let (addr, _root) = start_server(|_| {}).await;
    let mut client = login(addr, "alice", "secret").await;
    client.set_mode(TransferMode::Active);
    client.set_data_timeout(Duration::from_secs(5));

    client.store("active.txt", &mut &b"over PORT"[..]).await.unwrap();
    assert_eq!(client.retrieve("active.txt").await.unwrap(), b"over PORT");
    assert_eq!(client.list(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_port_rejects_privileged_and_foreign_targets() {
    let (addr, _root) = start_server(|_| {}).await;
    let mut client = login(addr, "alice", "secret").await;

    let reply = client.command(Verb::Port, "127,0,0,1,0,21").await.unwrap();
    assert_eq!(reply.code(), 501);
    let reply = client.command(Verb::Port, "10,1,2,3,200,10").await.unwrap();
    assert_eq!(reply.code(), 501);
    let reply = client.command(Verb::Port, "garbage").await.unwrap();
    assert_eq!(reply.code(), 501);
}

#[tokio::test]
async fn test_abort_and_quit() {
    let (addr, _root) = start_server(|_| {}).await;
    let mut client = login(addr, "alice", "secret").await;

    let reply = client.command(Verb::Abor, "").await.unwrap();
    assert_eq!(reply.code(), 225);

    let reply = client.command(Verb::Type, "A").await.unwrap();
    assert_eq!(reply.code(), 200);
    let reply = client.command(Verb::Type, "E").await.unwrap();
    assert_eq!(reply.code(), 504);
    let reply = client.command(Verb::Syst, "").await.unwrap();
    assert_eq!(reply.code(), 215);
    let reply = client.command(Verb::Unknown("FEAT".into()), "").await.unwrap();
    assert_eq!(reply.code(), 500);

    client.quit().await.unwrap();
    assert_eq!(client.state(), ClientState::Closed);
    assert!(matches!(client.noop().await, Err(ClientError::NotConnected)));
}

#[tokio::test]
async fn test_connection_limit() {
    let (addr, _root) = start_server(|c| {
        c.max_connections = 1;
        c.max_connections_per_ip = 1;
    })
    .await;

    let mut first = login(addr, "alice", "secret").await;

    let err = FtpClient::connect(addr).await.err().unwrap();
    assert_eq!(reply_code(err), 421);

    // The slot frees up once the first client leaves
    first.quit().await.unwrap();
    drop(first);

    let mut admitted = None;
    for _ in 0..50 {
        match FtpClient::connect(addr).await {
            Ok(client) => {
                admitted = Some(client);
                break;
            }
            Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    }
    assert!(admitted.is_some());
}

#[tokio::test]
async fn test_concurrent_clients() {
    let (addr, root) = start_server(|_| {}).await;

    let upload = |name: &'static str, byte: u8| async move {
        let mut client = login(addr, "alice", "secret").await;
        let data = vec![byte; 50_000];
        client.store(name, &mut data.as_slice()).await.unwrap();
        assert_eq!(client.retrieve(name).await.unwrap(), data);
        client.quit().await.unwrap();
    };

    tokio::join!(upload("one.bin", 1), upload("two.bin", 2));

    assert_eq!(std::fs::read(root.path().join("one.bin")).unwrap(), vec![1; 50_000]);
    assert_eq!(std::fs::read(root.path().join("two.bin")).unwrap(), vec![2; 50_000]);
}

#[tokio::test]
async fn test_oversized_upload_keeps_client_in_step() {
    let (addr, root) = start_server(|c| c.max_upload_mb = 1).await;
    let mut client = login(addr, "alice", "secret").await;

    let data = vec![7u8; 4 * 1024 * 1024];
    let err = client.store("big.bin", &mut data.as_slice()).await.unwrap_err();
    assert_eq!(reply_code(err), 552);
    assert!(!root.path().join("big.bin").exists());
    assert!(upload_temporaries(root.path()).is_empty());

    // The 552 was consumed; later replies line up with their commands
    assert_eq!(client.pwd().await.unwrap(), "/");
    client.noop().await.unwrap();
}

#[tokio::test]
async fn test_abort_running_upload() {
    let (addr, root) = start_server(|_| {}).await;
    let mut control = Control::login(addr).await;

    let mut data = control.passive().await;
    assert_eq!(control.send(Verb::Stor, "slow.bin").await.code(), 150);
    data.write_all(b"partial").await.unwrap();
    assert_eq!(upload_temporaries(root.path()).len(), 1);

    // Transfer commands wait for the running one; the rest is served
    assert_eq!(control.send(Verb::Pasv, "").await.code(), 503);
    assert_eq!(control.send(Verb::Stor, "other.bin").await.code(), 503);
    assert_eq!(control.send(Verb::Noop, "").await.code(), 200);

    assert_eq!(control.send(Verb::Abor, "").await.code(), 426);
    assert_eq!(control.reply().await.code(), 226);
    assert!(wait_until(|| upload_temporaries(root.path()).is_empty()).await);
    assert!(!root.path().join("slow.bin").exists());

    assert_eq!(control.send(Verb::Pwd, "").await.code(), 257);
}

#[tokio::test]
async fn test_quit_or_disconnect_cancels_upload() {
    let (addr, root) = start_server(|_| {}).await;

    let mut control = Control::login(addr).await;
    let mut first = control.passive().await;
    assert_eq!(control.send(Verb::Stor, "quit.bin").await.code(), 150);
    first.write_all(b"abc").await.unwrap();
    assert_eq!(control.send(Verb::Quit, "").await.code(), 221);
    assert!(wait_until(|| upload_temporaries(root.path()).is_empty()).await);

    let mut control = Control::login(addr).await;
    let mut second = control.passive().await;
    assert_eq!(control.send(Verb::Stor, "dropped.bin").await.code(), 150);
    second.write_all(b"abc").await.unwrap();
    assert_eq!(upload_temporaries(root.path()).len(), 1);
    drop(control);
    assert!(wait_until(|| upload_temporaries(root.path()).is_empty()).await);

    // Both data connections are still open, so neither upload could finish
    assert!(!root.path().join("quit.bin").exists());
    assert!(!root.path().join("dropped.bin").exists());
    drop((first, second));
}

#[tokio::test]
async fn test_idle_control_connection_is_closed() {
    let (addr, _root) = start_server(|c| c.control_idle_timeout_secs = 1).await;
    let mut control = Control::login(addr).await;

    let reply = timeout(Duration::from_secs(5), control.reply()).await.unwrap();
    assert_eq!(reply.code(), 421);
    assert!(control.replies.next_reply().await.is_err());
}

#[tokio::test]
async fn test_stalled_data_connection_times_out() {
    let (addr, root) = start_server(|c| c.data_idle_timeout_secs = 1).await;
    let mut control = Control::login(addr).await;

    let _data = control.passive().await;
    assert_eq!(control.send(Verb::Stor, "stalled.bin").await.code(), 150);

    let reply = timeout(Duration::from_secs(5), control.reply()).await.unwrap();
    assert_eq!(reply.code(), 426);
    assert!(upload_temporaries(root.path()).is_empty());
    assert!(!root.path().join("stalled.bin").exists());

    // Only the transfer ended
    assert_eq!(control.send(Verb::Pwd, "").await.code(), 257);
}
