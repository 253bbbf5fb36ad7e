//! The command-word table: [`MessageKind`], [`Payload`], and [`Origin`].
//!
//! Every message kind is declared exactly once, in the `message_table!`
//! invocation at the bottom of this file. The macro expands that list into
//! the kind enum, the payload tagged union, and the pure lookup functions
//! between them, so the two directions of the table can't drift apart.
//!
//! Two kinds don't carry a JSON object and are written out by hand:
//! `//` (a comment, whose body is raw text) and `PROTOCOL` (a bare
//! integer). Two more, `Error` and `Unknown`, never appear on the wire:
//! they are what the decoder produces for lines it can't make sense of.

use std::fmt;

use crate::types::*;
use crate::ProtocolError;

/// Which side of a connection may originate a message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Only the server sends this.
    Server,
    /// Only a client sends this.
    Client,
    /// Either side may send this.
    Either,
}

impl Origin {
    /// Returns `true` if a server may send this kind.
    pub fn server_may_send(self) -> bool {
        !matches!(self, Origin::Client)
    }

    /// Returns `true` if a client may send this kind.
    pub fn client_may_send(self) -> bool {
        !matches!(self, Origin::Server)
    }
}

macro_rules! message_table {
    ($(
        $(#[$meta:meta])*
        $variant:ident($ty:ty) = $word:literal, $origin:ident;
    )*) => {
        /// Internal identifier for each command word.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum MessageKind {
            /// `//`: a comment line. Free text, no JSON.
            Comment,
            /// `PROTOCOL`: the version banner.
            Protocol,
            $( $(#[$meta])* $variant, )*
            /// A known command word whose body failed to decode.
            Error,
            /// A command word not in the table.
            Unknown,
        }

        /// A decoded message body: one variant per command word.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Payload {
            /// `//`: comment text (without the leading `// `).
            Comment(String),
            /// `PROTOCOL`: the version the server speaks.
            Protocol(u32),
            $( $(#[$meta])* $variant($ty), )*
            /// A known command word whose body failed to decode.
            Error(DecodeFailure),
            /// A command word not in the table.
            Unknown(UnknownCommand),
        }

        impl MessageKind {
            /// Every kind, in table order.
            pub const ALL: &'static [MessageKind] = &[
                MessageKind::Comment,
                MessageKind::Protocol,
                $( MessageKind::$variant, )*
                MessageKind::Error,
                MessageKind::Unknown,
            ];

            /// The command word for this kind. `Error` and `Unknown` have
            /// none.
            pub const fn command(self) -> Option<&'static str> {
                match self {
                    MessageKind::Comment => Some("//"),
                    MessageKind::Protocol => Some("PROTOCOL"),
                    $( MessageKind::$variant => Some($word), )*
                    MessageKind::Error | MessageKind::Unknown => None,
                }
            }

            /// Looks up a command word.
            pub fn from_command(word: &str) -> Option<MessageKind> {
                match word {
                    "//" => Some(MessageKind::Comment),
                    "PROTOCOL" => Some(MessageKind::Protocol),
                    $( $word => Some(MessageKind::$variant), )*
                    _ => None,
                }
            }

            /// Which side may originate this kind.
            pub const fn origin(self) -> Origin {
                match self {
                    MessageKind::Comment => Origin::Either,
                    MessageKind::Protocol => Origin::Server,
                    $( MessageKind::$variant => Origin::$origin, )*
                    MessageKind::Error | MessageKind::Unknown => Origin::Either,
                }
            }
        }

        impl Payload {
            /// The kind of this payload.
            pub fn kind(&self) -> MessageKind {
                match self {
                    Payload::Comment(_) => MessageKind::Comment,
                    Payload::Protocol(_) => MessageKind::Protocol,
                    $( Payload::$variant(_) => MessageKind::$variant, )*
                    Payload::Error(_) => MessageKind::Error,
                    Payload::Unknown(_) => MessageKind::Unknown,
                }
            }

            /// Serializes the JSON body of a table-driven payload.
            /// Returns `None` for the hand-written kinds.
            pub(crate) fn json_body(
                &self,
            ) -> Option<Result<String, ProtocolError>> {
                match self {
                    $( Payload::$variant(body) => Some(
                        serde_json::to_string(body)
                            .map_err(ProtocolError::Encode),
                    ), )*
                    _ => None,
                }
            }

            /// Decodes a JSON body for a table-driven kind. Returns `None`
            /// for the hand-written kinds.
            pub(crate) fn from_json(
                kind: MessageKind,
                body: &str,
            ) -> Option<Result<Payload, serde_json::Error>> {
                match kind {
                    $( MessageKind::$variant => Some(
                        serde_json::from_str::<$ty>(body)
                            .map(Payload::$variant),
                    ), )*
                    _ => None,
                }
            }
        }
    };
}

message_table! {
    /// `AC`: add a character to the roster.
    AddCharacter(Creature) = "AC", Server;
    /// `ACCEPT`: subscription filter for this connection.
    Accept(Accept) = "ACCEPT", Client;
    /// `AI`: image definition.
    AddImage(ImageDefinition) = "AI", Either;
    /// `AI?`: ask who has an image.
    QueryImage(ImageDefinition) = "AI?", Either;
    /// `ALLOW`: optional features the client understands.
    Allow(Allow) = "ALLOW", Client;
    /// `AUTH`: challenge response.
    Auth(Auth) = "AUTH", Client;
    /// `AV`: scroll the map view.
    AdjustView(AdjustView) = "AV", Server;
    /// `CC`: clear chat history.
    ClearChat(ClearChat) = "CC", Either;
    /// `CLR`: remove objects.
    Clear(Clear) = "CLR", Either;
    /// `CLR@`: remove objects loaded from a file.
    ClearFrom(ClearFrom) = "CLR@", Either;
    /// `CO`: combat mode.
    CombatMode(CombatMode) = "CO", Either;
    /// `CONN`: peer list.
    UpdatePeerList(UpdatePeerList) = "CONN", Server;
    /// `/CONN`: ask for the peer list.
    QueryPeers(QueryPeers) = "/CONN", Client;
    /// `CS`: game clock.
    UpdateClock(UpdateClock) = "CS", Either;
    /// `D`: roll dice.
    RollDice(RollDice) = "D", Client;
    /// `DD`: replace die-roll presets.
    DefineDicePresets(DicePresets) = "DD", Client;
    /// `DD+`: add die-roll presets.
    AddDicePresets(DicePresets) = "DD+", Client;
    /// `DD/`: delete matching die-roll presets.
    FilterDicePresets(FilterDicePresets) = "DD/", Client;
    /// `DD=`: the server's copy of a user's presets.
    UpdateDicePresets(DicePresets) = "DD=", Server;
    /// `DENIED`: login refused.
    Denied(Denied) = "DENIED", Server;
    /// `DR`: ask for die-roll presets.
    QueryDicePresets(QueryDicePresets) = "DR", Client;
    /// `DSM`: define a status marker.
    UpdateStatusMarker(StatusMarker) = "DSM", Server;
    /// `ECHO`: round-trip probe.
    Echo(Echo) = "ECHO", Either;
    /// `FAILED`: a request failed.
    Failed(Failed) = "FAILED", Server;
    /// `GRANTED`: login succeeded.
    Granted(Granted) = "GRANTED", Server;
    /// `I`: current turn.
    UpdateTurn(UpdateTurn) = "I", Either;
    /// `IL`: initiative order.
    UpdateInitiative(UpdateInitiative) = "IL", Either;
    /// `L`: load a map file.
    LoadFrom(LoadFrom) = "L", Either;
    /// `LS-ARC`: arc element.
    LoadArcObject(MapObject) = "LS-ARC", Either;
    /// `LS-CIRC`: circle element.
    LoadCircleObject(MapObject) = "LS-CIRC", Either;
    /// `LS-LINE`: line element.
    LoadLineObject(MapObject) = "LS-LINE", Either;
    /// `LS-POLY`: polygon element.
    LoadPolygonObject(MapObject) = "LS-POLY", Either;
    /// `LS-RECT`: rectangle element.
    LoadRectangleObject(MapObject) = "LS-RECT", Either;
    /// `LS-SAW`: spell area of effect.
    LoadSpellAreaOfEffectObject(MapObject) = "LS-SAW", Either;
    /// `LS-TEXT`: text element.
    LoadTextObject(MapObject) = "LS-TEXT", Either;
    /// `LS-TILE`: image tile element.
    LoadTileObject(MapObject) = "LS-TILE", Either;
    /// `MARCO`: keepalive ping.
    Marco(Marco) = "MARCO", Either;
    /// `MARK`: flash a map location.
    Mark(Mark) = "MARK", Either;
    /// `OA`: change object attributes.
    UpdateObjAttributes(UpdateObjAttributes) = "OA", Either;
    /// `OA+`: add attribute values.
    AddObjAttributes(ObjAttributeValues) = "OA+", Either;
    /// `OA-`: remove attribute values.
    RemoveObjAttributes(ObjAttributeValues) = "OA-", Either;
    /// `OK`: login challenge.
    Challenge(Challenge) = "OK", Server;
    /// `POLO`: keepalive reply.
    Polo(Polo) = "POLO", Either;
    /// `PRIV`: command refused.
    Priv(Priv) = "PRIV", Server;
    /// `PROGRESS`: long-running operation status.
    UpdateProgress(UpdateProgress) = "PROGRESS", Server;
    /// `PS`: place a creature on the map.
    PlaceSomeone(Creature) = "PS", Either;
    /// `READY`: login complete.
    Ready(Ready) = "READY", Server;
    /// `REDIRECT`: use another server.
    Redirect(Redirect) = "REDIRECT", Server;
    /// `ROLL`: die-roll result.
    RollResult(RollResult) = "ROLL", Server;
    /// `SYNC`: resend full state.
    Sync(SyncRequest) = "SYNC", Client;
    /// `SYNC-CHAT`: replay chat history.
    SyncChat(SyncChat) = "SYNC-CHAT", Client;
    /// `TB`: toolbar visibility.
    Toolbar(Toolbar) = "TB", Server;
    /// `TMACK`: timer created or changed.
    TimerAcknowledge(TimerAcknowledge) = "TMACK", Server;
    /// `TMRQ`: start a timer.
    TimerRequest(TimerRequest) = "TMRQ", Client;
    /// `TO`: chat message.
    ChatMessage(ChatMessage) = "TO", Either;
    /// `UPDATES`: latest client software versions.
    UpdateVersions(UpdateVersions) = "UPDATES", Server;
    /// `WORLD`: campaign-wide settings.
    World(World) = "WORLD", Server;
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.command() {
            Some(word) => f.write_str(word),
            None => write!(f, "<{self:?}>"),
        }
    }
}

impl MessageKind {
    /// Kinds that carry session housekeeping rather than application
    /// state. They are delivered even when an `ACCEPT` filter leaves them
    /// out.
    pub fn bypasses_filter(self) -> bool {
        matches!(
            self,
            MessageKind::Protocol
                | MessageKind::Challenge
                | MessageKind::Granted
                | MessageKind::Denied
                | MessageKind::Ready
                | MessageKind::Marco
                | MessageKind::Priv
                | MessageKind::Redirect
                | MessageKind::Echo
        )
    }
}
