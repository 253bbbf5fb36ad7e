//! Integration tests for the server session.
//!
//! Most tests drive a `ServerSession` over an in-memory duplex stream,
//! playing the client by hand. The last one goes through the TCP accept
//! loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mapwire_protocol::{decode_line, encode_line, Auth, Challenge, Envelope, Payload};
use mapwire_server::{MapwireServerBuilder, Peer, Preamble, Registry, ServerConfig, ServerError, ServerSession};
use mapwire_session::{Authenticator, SessionError};
use mapwire_transport::Connection;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

// =========================================================================
// Recording registry
// =========================================================================

#[derive(Debug, PartialEq)]
enum Event {
    Added { user: String, gm: bool },
    Removed(String),
    Message(String),
    GameState(String),
}

#[derive(Default)]
struct Recorder {
    events: Option<mpsc::UnboundedSender<Event>>,
    personal: HashMap<String, Vec<u8>>,
    preamble: Preamble,
    /// Extra comment lines pushed after the marker during a sync.
    game_state_lines: usize,
}

impl Recorder {
    fn record(&self, event: Event) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

impl Registry for Recorder {
    async fn personal_credentials(&self, user: &str) -> Option<Vec<u8>> {
        self.personal.get(user).cloned()
    }

    async fn client_preamble(&self) -> Preamble {
        self.preamble.clone()
    }

    async fn handle_message(&self, envelope: Envelope, _peer: &Peer) {
        self.record(Event::Message(envelope.raw));
    }

    async fn add_client(&self, peer: Peer) {
        self.record(Event::Added {
            user: peer.username().to_string(),
            gm: peer.is_gm(),
        });
    }

    async fn remove_client(&self, peer: &Peer) {
        self.record(Event::Removed(peer.username().to_string()));
    }

    async fn send_game_state(&self, peer: &Peer) {
        let _ = peer.send_line("// game state");
        for i in 0..self.game_state_lines {
            if peer.send_wait(&Payload::Comment(format!("state {i}"))).await.is_err() {
                break;
            }
        }
        self.record(Event::GameState(peer.username().to_string()));
    }
}

// =========================================================================
// Hand-driven client
// =========================================================================

struct Harness {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    write: WriteHalf<DuplexStream>,
    events: mpsc::UnboundedReceiver<Event>,
    cancel: CancellationToken,
    task: JoinHandle<Result<(), ServerError>>,
}

fn secured() -> ServerConfig {
    ServerConfig {
        player_secret: Some("sekrit".into()),
        gm_secret: Some("gmsecret".into()),
        denied_flush_delay_ms: 0,
        ..ServerConfig::default()
    }
}

fn start(config: ServerConfig, mut registry: Recorder) -> Harness {
    let (tx, events) = mpsc::unbounded_channel();
    registry.events = Some(tx);

    let (ours, theirs) = tokio::io::duplex(64 * 1024);
    let cancel = CancellationToken::new();
    let conn = Connection::open(ours, None, &config.connection, &cancel);
    let config = Arc::new(config);
    let session = ServerSession::new(conn, Arc::new(registry), config.authenticator(), config);
    let task = tokio::spawn(session.run(cancel.clone()));

    let (read, write) = tokio::io::split(theirs);
    Harness {
        lines: BufReader::new(read).lines(),
        write,
        events,
        cancel,
        task,
    }
}

impl Harness {
    async fn send(&mut self, line: &str) {
        self.write
            .write_all(format!("{line}\n").as_bytes())
            .await
            .unwrap();
    }

    async fn send_payload(&mut self, payload: Payload) {
        let line = encode_line(&payload).unwrap();
        self.send(&line).await;
    }

    async fn recv(&mut self) -> String {
        tokio::time::timeout(WAIT, self.lines.next_line())
            .await
            .expect("server should send a line")
            .unwrap()
            .expect("server closed the connection")
    }

    async fn recv_payload(&mut self) -> Payload {
        let line = self.recv().await;
        decode_line(&line).payload
    }

    /// Reads the banner and everything up to the challenge. Returns the
    /// preamble lines seen on the way and the challenge.
    async fn challenge(&mut self) -> (Vec<String>, Challenge) {
        assert_eq!(self.recv().await, "PROTOCOL 411");
        let mut seen = Vec::new();
        loop {
            let line = self.recv().await;
            match decode_line(&line).payload {
                Payload::Challenge(challenge) => return (seen, challenge),
                _ => seen.push(line),
            }
        }
    }

    /// Answers the challenge as `user` with `secret`.
    async fn answer(&mut self, challenge: &Challenge, user: &str, secret: &str) {
        let mut auth = Authenticator::client(user, secret);
        let nonce = challenge.challenge.as_deref().expect("challenge nonce");
        let response = auth.accept_challenge(nonce).unwrap();
        self.send_payload(Payload::Auth(Auth {
            response,
            user: user.into(),
            client: "test-client".into(),
        }))
        .await;
    }

    /// Full login. Returns the lines after the challenge, up to and
    /// including `READY`.
    async fn login(&mut self, user: &str, secret: &str) -> Vec<String> {
        let (_, challenge) = self.challenge().await;
        self.answer(&challenge, user, secret).await;
        let mut seen = Vec::new();
        loop {
            let line = self.recv().await;
            let done = line == "READY";
            seen.push(line);
            if done {
                return seen;
            }
        }
    }

    async fn event(&mut self) -> Event {
        tokio::time::timeout(WAIT, self.events.recv())
            .await
            .expect("registry event")
            .expect("registry dropped")
    }

    async fn finish(self) -> Result<(), ServerError> {
        tokio::time::timeout(WAIT, self.task)
            .await
            .expect("session should end")
            .unwrap()
    }
}

// =========================================================================
// Login
// =========================================================================

#[tokio::test]
async fn test_player_login_is_granted_and_registered() {
    let mut h = start(secured(), Recorder::default());
    let after = h.login("alice", "sekrit").await;

    assert_eq!(after.len(), 2);
    match decode_line(&after[0]).payload {
        Payload::Granted(g) => assert_eq!(g.user, "alice"),
        other => panic!("expected GRANTED, got {other:?}"),
    }
    assert_eq!(
        h.event().await,
        Event::Added {
            user: "alice".into(),
            gm: false
        }
    );
}

#[tokio::test]
async fn test_gm_secret_logs_in_as_gm() {
    let mut h = start(secured(), Recorder::default());
    let after = h.login("bob", "gmsecret").await;

    match decode_line(&after[0]).payload {
        Payload::Granted(g) => assert_eq!(g.user, "GM"),
        other => panic!("expected GRANTED, got {other:?}"),
    }
    assert_eq!(
        h.event().await,
        Event::Added {
            user: "GM".into(),
            gm: true
        }
    );
}

#[tokio::test]
async fn test_wrong_secret_is_denied() {
    let mut h = start(secured(), Recorder::default());
    let (_, challenge) = h.challenge().await;
    h.answer(&challenge, "alice", "guess").await;

    match h.recv_payload().await {
        Payload::Denied(d) => assert_eq!(d.reason, "login incorrect"),
        other => panic!("expected DENIED, got {other:?}"),
    }
    let err = h.finish().await.unwrap_err();
    assert!(matches!(
        err,
        ServerError::Session(SessionError::AccessDenied(_))
    ));
}

#[tokio::test]
async fn test_personal_credentials_replace_shared_secret() {
    let registry = Recorder {
        personal: HashMap::from([("carol".to_string(), b"carols-own".to_vec())]),
        ..Recorder::default()
    };
    let mut h = start(secured(), registry);
    let (_, challenge) = h.challenge().await;
    h.answer(&challenge, "carol", "sekrit").await;

    assert!(matches!(h.recv_payload().await, Payload::Denied(_)));
    h.finish().await.unwrap_err();

    let registry = Recorder {
        personal: HashMap::from([("carol".to_string(), b"carols-own".to_vec())]),
        ..Recorder::default()
    };
    let mut h = start(secured(), registry);
    let after = h.login("carol", "carols-own").await;
    assert!(matches!(decode_line(&after[0]).payload, Payload::Granted(_)));
}

#[tokio::test]
async fn test_personal_credentials_disable_gm_login() {
    let registry = Recorder {
        personal: HashMap::from([("carol".to_string(), b"carols-own".to_vec())]),
        ..Recorder::default()
    };
    let mut h = start(secured(), registry);
    let (_, challenge) = h.challenge().await;
    h.answer(&challenge, "carol", "gmsecret").await;

    assert!(matches!(h.recv_payload().await, Payload::Denied(_)));
}

#[tokio::test]
async fn test_open_server_sends_no_nonce() {
    let mut h = start(ServerConfig::default(), Recorder::default());
    let (_, challenge) = h.challenge().await;
    assert!(challenge.challenge.is_none());
    assert_eq!(challenge.protocol, 411);
    assert_eq!(h.recv().await, "READY");
    assert_eq!(
        h.event().await,
        Event::Added {
            user: String::new(),
            gm: false
        }
    );
}

#[tokio::test]
async fn test_preamble_lines_are_sent_in_order() {
    let registry = Recorder {
        preamble: Preamble {
            sync_data: true,
            pre_auth: vec!["// welcome".into()],
            post_auth: vec!["// you're in".into()],
            post_ready: vec!["// have fun".into()],
        },
        ..Recorder::default()
    };
    let mut h = start(secured(), registry);

    let (before, challenge) = h.challenge().await;
    assert_eq!(before, vec!["// welcome".to_string()]);
    h.answer(&challenge, "alice", "sekrit").await;

    assert!(matches!(h.recv_payload().await, Payload::Granted(_)));
    assert_eq!(h.recv().await, "// you're in");
    assert_eq!(h.recv().await, "READY");
    assert_eq!(h.recv().await, "// have fun");
    assert_eq!(h.recv().await, "// game state");
    assert_eq!(h.event().await, Event::GameState("alice".into()));
}

#[tokio::test(start_paused = true)]
async fn test_silent_client_times_out() {
    let config = ServerConfig {
        login_timeout_secs: 2,
        ..secured()
    };
    let h = start(config, Recorder::default());
    let result = h.task.await.unwrap();
    assert!(matches!(
        result,
        Err(ServerError::Session(SessionError::LoginTimeout))
    ));
}

#[tokio::test]
async fn test_preamble_longer_than_queue_is_sent_whole() {
    let config = secured();
    let count = config.connection.queue_depth + 36;
    let pre_auth: Vec<String> = (0..count)
        .map(|i| format!(r#"AC {{"ID":"PC{i}","Name":"Hero {i}"}}"#))
        .collect();
    let registry = Recorder {
        preamble: Preamble {
            pre_auth: pre_auth.clone(),
            ..Preamble::default()
        },
        ..Recorder::default()
    };
    let mut h = start(config, registry);

    let (before, challenge) = h.challenge().await;
    assert_eq!(before, pre_auth);
    h.answer(&challenge, "alice", "sekrit").await;
    assert!(matches!(h.recv_payload().await, Payload::Granted(_)));
    assert_eq!(h.recv().await, "READY");
    assert!(matches!(h.event().await, Event::Added { .. }));
}

#[tokio::test]
async fn test_game_state_push_longer_than_queue_is_sent_whole() {
    let config = secured();
    let count = config.connection.queue_depth * 2;
    let registry = Recorder {
        preamble: Preamble {
            sync_data: true,
            ..Preamble::default()
        },
        game_state_lines: count,
        ..Recorder::default()
    };
    let mut h = start(config, registry);
    h.login("alice", "sekrit").await;

    assert_eq!(h.recv().await, "// game state");
    for i in 0..count {
        assert_eq!(h.recv().await, format!("// state {i}"));
    }
    assert_eq!(h.event().await, Event::GameState("alice".into()));
    assert!(matches!(h.event().await, Event::Added { .. }));
}

// =========================================================================
// Steady state
// =========================================================================

#[tokio::test]
async fn test_messages_reach_registry() {
    let mut h = start(secured(), Recorder::default());
    h.login("alice", "sekrit").await;
    h.event().await;

    h.send(r#"TO {"Text":"hi","ToAll":true}"#).await;
    h.send("BOGUS stuff").await;
    assert_eq!(
        h.event().await,
        Event::Message(r#"TO {"Text":"hi","ToAll":true}"#.into())
    );
    assert_eq!(h.event().await, Event::Message("BOGUS stuff".into()));
}

#[tokio::test]
async fn test_server_only_command_gets_priv() {
    let mut h = start(secured(), Recorder::default());
    h.login("alice", "sekrit").await;
    h.event().await;

    h.send(r#"GRANTED {"User":"GM"}"#).await;
    match h.recv_payload().await {
        Payload::Priv(p) => assert_eq!(p.command, "GRANTED"),
        other => panic!("expected PRIV, got {other:?}"),
    }

    h.send(r#"AUTH {"Response":"x"}"#).await;
    match h.recv_payload().await {
        Payload::Priv(p) => assert_eq!(p.command, "AUTH"),
        other => panic!("expected PRIV, got {other:?}"),
    }
}

#[tokio::test]
async fn test_marco_and_echo_are_answered() {
    let mut h = start(secured(), Recorder::default());
    h.login("alice", "sekrit").await;

    h.send("MARCO").await;
    assert_eq!(h.recv().await, "POLO");

    h.send(r#"ECHO {"B":true,"I":42,"S":"ping"}"#).await;
    match h.recv_payload().await {
        Payload::Echo(echo) => {
            assert!(echo.b);
            assert_eq!(echo.i, 42);
            assert_eq!(echo.s, "ping");
            let received = echo.received_time.expect("received time");
            let sent = echo.sent_time.expect("sent time");
            assert!(sent >= received);
        }
        other => panic!("expected ECHO, got {other:?}"),
    }
}

#[tokio::test]
async fn test_disconnect_deregisters_once() {
    let mut h = start(secured(), Recorder::default());
    h.login("alice", "sekrit").await;
    assert!(matches!(h.event().await, Event::Added { .. }));

    let Harness {
        lines,
        write,
        mut events,
        task,
        ..
    } = h;
    drop(write);
    drop(lines);
    let removed = tokio::time::timeout(WAIT, events.recv())
        .await
        .expect("registry event")
        .expect("registry alive");
    assert_eq!(removed, Event::Removed("alice".into()));
    tokio::time::timeout(WAIT, task)
        .await
        .expect("session should end")
        .unwrap()
        .unwrap();
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_cancel_ends_session_and_deregisters() {
    let mut h = start(secured(), Recorder::default());
    h.login("alice", "sekrit").await;
    h.event().await;

    h.cancel.cancel();
    assert_eq!(h.event().await, Event::Removed("alice".into()));
}

// =========================================================================
// TCP accept loop
// =========================================================================

#[tokio::test]
async fn test_server_accepts_over_tcp() {
    let (tx, mut events) = mpsc::unbounded_channel();
    let registry = Recorder {
        events: Some(tx),
        ..Recorder::default()
    };
    let server = MapwireServerBuilder::new()
        .bind("127.0.0.1:0")
        .config(secured())
        .build(registry)
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let cancel = CancellationToken::new();
    let running = tokio::spawn(server.run(cancel.clone()));

    let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    assert_eq!(lines.next_line().await.unwrap().unwrap(), "PROTOCOL 411");
    let challenge = match decode_line(&lines.next_line().await.unwrap().unwrap()).payload {
        Payload::Challenge(c) => c,
        other => panic!("expected OK, got {other:?}"),
    };
    let response = Authenticator::client("dave", "sekrit")
        .accept_challenge(challenge.challenge.as_deref().unwrap())
        .unwrap();
    let auth = encode_line(&Payload::Auth(Auth {
        response,
        user: "dave".into(),
        client: "tcp-test".into(),
    }))
    .unwrap();
    write.write_all(format!("{auth}\n").as_bytes()).await.unwrap();

    assert!(lines.next_line().await.unwrap().unwrap().starts_with("GRANTED"));
    assert_eq!(lines.next_line().await.unwrap().unwrap(), "READY");
    assert_eq!(
        tokio::time::timeout(WAIT, events.recv()).await.unwrap().unwrap(),
        Event::Added {
            user: "dave".into(),
            gm: false
        }
    );

    cancel.cancel();
    tokio::time::timeout(WAIT, running)
        .await
        .expect("server should stop")
        .unwrap()
        .unwrap();
    assert_eq!(
        tokio::time::timeout(WAIT, events.recv()).await.unwrap().unwrap(),
        Event::Removed("dave".into())
    );
}
