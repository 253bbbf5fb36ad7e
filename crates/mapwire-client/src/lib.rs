//! Client side of the Mapwire protocol.
//!
//! A [`ClientSession`] dials a server, answers its login challenge, and
//! then hands incoming messages to the application through subscriptions.
//! Kinds nobody subscribed to get built-in handling: `MARCO` is answered
//! with `POLO`, undecodable and unknown lines are logged, everything else
//! is dropped. Login data (`AC`, `DSM`, `WORLD`, `UPDATES`, comments) is
//! cached and readable through the [`SessionHandle`].
//!
//! ```rust,no_run
//! use mapwire_client::{ClientConfig, ClientSession};
//! use mapwire_protocol::{ChatMessage, MessageKind, Payload};
//! use tokio::sync::mpsc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> Result<(), mapwire_client::ClientError> {
//! let config = ClientConfig::new("maps.example:2323")
//!     .with_credentials("alice", "table secret");
//! let session = ClientSession::new(config);
//! let handle = session.handle();
//!
//! let (tx, mut chat) = mpsc::channel(32);
//! handle.subscribe(&[MessageKind::ChatMessage], tx);
//!
//! let cancel = CancellationToken::new();
//! tokio::spawn(session.run(cancel.clone()));
//!
//! handle.wait_until_ready().await?;
//! handle.send(&Payload::ChatMessage(ChatMessage {
//!     to_all: true,
//!     text: "hello".into(),
//!     ..ChatMessage::default()
//! }))?;
//! while let Some(msg) = chat.recv().await {
//!     println!("{}", msg.raw);
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod handle;
mod session;
mod shared;

pub use config::ClientConfig;
pub use error::ClientError;
pub use handle::SessionHandle;
pub use session::ClientSession;
