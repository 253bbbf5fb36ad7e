//! Payload types carried by each command word.
//!
//! Every JSON body on the wire is an object with PascalCase field names.
//! All structs here use `#[serde(default)]`: a field missing from the
//! incoming JSON takes its zero value, and fields we don't know about are
//! ignored. That lets either side add fields without breaking older peers.
//!
//! Map elements, creatures, and dice results are opaque at this layer.
//! They carry an identifier plus whatever attributes the application puts
//! in them; the protocol only moves them around.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form attribute bag for opaque application objects.
pub type Attributes = Map<String, Value>;

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

/// `OK` (Server → Client): the login challenge.
///
/// `challenge` is the base64 nonce. When it is `None` the server doesn't
/// require authentication and the client goes straight on to wait for
/// `READY`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Challenge {
    pub protocol: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge: Option<String>,
    pub server_version: String,
}

/// `AUTH` (Client → Server): response to the challenge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Auth {
    /// Base64 of the 32-byte hash-chain response.
    pub response: String,
    /// Requested username.
    pub user: String,
    /// Client program name and version, for the server's peer list.
    pub client: String,
}

/// `GRANTED` (Server → Client): login succeeded as `user`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Granted {
    pub user: String,
}

/// `DENIED` (Server → Client): login refused.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Denied {
    pub reason: String,
}

/// `READY` (Server → Client): the login sequence is complete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ready {}

/// `REDIRECT` (Server → Client): reconnect to a different server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Redirect {
    pub host: String,
    pub port: u16,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Session housekeeping
// ---------------------------------------------------------------------------

/// `ACCEPT` (Client → Server): only send me these command words.
///
/// An empty list means "send everything".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Accept {
    pub messages: Vec<String>,
}

/// `ALLOW` (Client → Server): optional protocol features this client
/// understands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Allow {
    pub features: Vec<String>,
}

/// `MARCO`: keepalive ping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marco {}

/// `POLO`: keepalive reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Polo {}

/// `ECHO`: round-trip probe. The server fills in the two timestamps
/// (milliseconds since the Unix epoch) and sends it back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Echo {
    pub b: bool,
    pub i: i64,
    pub s: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_time: Option<u64>,
}

/// `PRIV` (Server → Client): the command was refused.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Priv {
    pub command: String,
    pub reason: String,
}

/// `FAILED` (Server → Client): a request could not be carried out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Failed {
    pub is_error: bool,
    pub is_discretionary: bool,
    #[serde(rename = "RequestID")]
    pub request_id: String,
    pub reason: String,
    pub command: String,
}

/// `/CONN` (Client → Server): ask for the peer list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPeers {}

/// One entry of a `CONN` peer list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PeerInfo {
    pub addr: String,
    pub user: String,
    pub client: String,
    /// Seconds since this peer last answered a `MARCO`.
    pub last_polo: f64,
    pub is_authenticated: bool,
    pub is_me: bool,
}

/// `CONN` (Server → Client): who is connected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct UpdatePeerList {
    pub peer_list: Vec<PeerInfo>,
}

/// `SYNC` (Client → Server): resend the full game state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {}

/// `SYNC-CHAT` (Client → Server): replay chat history.
///
/// `target` selects where replay starts: 0 for everything, a positive
/// message ID to start after it, a negative number for the last N.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SyncChat {
    pub target: i64,
}

/// `UPDATES` (Server → Client): latest known versions of client software.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct UpdateVersions {
    pub packages: Vec<PackageUpdate>,
}

/// Available builds of one software package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PackageUpdate {
    pub name: String,
    pub instances: Vec<PackageVersion>,
}

/// One build of a package for a platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PackageVersion {
    #[serde(rename = "OS")]
    pub os: String,
    pub arch: String,
    pub version: String,
    pub token: String,
}

/// `WORLD` (Server → Client): campaign-wide settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct World {
    pub calendar: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_settings: Option<ClientSettings>,
}

/// Client-side settings pushed by the server in `WORLD`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ClientSettings {
    #[serde(rename = "ImageBaseURL")]
    pub image_base_url: String,
    pub mkdir_path: String,
    pub module_code: String,
    pub server_mkdirs: String,
}

/// `PROGRESS` (Server → Client): status of a long-running operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct UpdateProgress {
    #[serde(rename = "OperationID")]
    pub operation_id: String,
    pub title: String,
    pub value: i64,
    pub max_value: i64,
    pub is_done: bool,
    pub targets: Vec<String>,
}

/// `TB` (Server → Client): show or hide the toolbar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Toolbar {
    pub enabled: bool,
}

// ---------------------------------------------------------------------------
// Chat, dice, timers
// ---------------------------------------------------------------------------

/// `TO`: a chat message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ChatMessage {
    pub sender: String,
    pub recipients: Vec<String>,
    pub to_all: bool,
    #[serde(rename = "ToGM")]
    pub to_gm: bool,
    pub text: String,
    #[serde(rename = "MessageID")]
    pub message_id: i64,
    pub sent: String,
}

/// `CC`: clear the chat history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ClearChat {
    pub requested_by: String,
    pub do_silently: bool,
    pub target: i64,
    #[serde(rename = "MessageID")]
    pub message_id: i64,
}

/// `D` (Client → Server): roll dice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RollDice {
    #[serde(rename = "RequestID")]
    pub request_id: String,
    pub roll_spec: String,
    pub recipients: Vec<String>,
    pub to_all: bool,
    #[serde(rename = "ToGM")]
    pub to_gm: bool,
}

/// `ROLL` (Server → Client): the outcome of a die roll.
///
/// `result` is produced by the dice evaluator and is opaque here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RollResult {
    pub sender: String,
    pub recipients: Vec<String>,
    pub to_all: bool,
    #[serde(rename = "ToGM")]
    pub to_gm: bool,
    #[serde(rename = "MessageID")]
    pub message_id: i64,
    pub title: String,
    pub result: Value,
    #[serde(rename = "RequestID")]
    pub request_id: String,
    pub more_results: bool,
}

/// A stored die-roll expression.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DieRollPreset {
    pub name: String,
    pub description: String,
    pub dieroll: String,
}

/// `DD`, `DD+`, `DD=`: a user's die-roll presets (replace, add, or the
/// server's current list).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DicePresets {
    #[serde(rename = "For")]
    pub for_user: String,
    pub presets: Vec<DieRollPreset>,
}

/// `DD/` (Client → Server): delete presets whose names match `filter`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct FilterDicePresets {
    #[serde(rename = "For")]
    pub for_user: String,
    pub filter: String,
}

/// `DR` (Client → Server): send me my presets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct QueryDicePresets {
    #[serde(rename = "For")]
    pub for_user: String,
}

/// `TMRQ` (Client → Server): start a countdown timer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TimerRequest {
    #[serde(rename = "RequestID")]
    pub request_id: String,
    pub description: String,
    /// Expiry, as seconds since the Unix epoch.
    pub expires: i64,
    pub show_to: Vec<String>,
    pub is_running: bool,
}

/// `TMACK` (Server → Client): a timer was created or changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TimerAcknowledge {
    #[serde(rename = "RequestID")]
    pub request_id: String,
    #[serde(rename = "TimerID")]
    pub timer_id: String,
    pub requested_by: String,
    pub description: String,
    pub expires: i64,
    pub show_to: Vec<String>,
    pub is_running: bool,
}

// ---------------------------------------------------------------------------
// Map and combat state
// ---------------------------------------------------------------------------

/// `AC` and `PS`: a creature token (character roster entry or placed
/// creature).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Creature {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub color: String,
    pub area: String,
    pub size: String,
    pub gx: f64,
    pub gy: f64,
    pub skin: u32,
    pub skin_size: Vec<String>,
    pub note: String,
    pub status_list: Vec<String>,
}

/// `LS-*`: one map element. Everything but the ID is opaque.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapObject {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(flatten)]
    pub attributes: Attributes,
}

/// `DSM`: define a status marker (condition) and how it is drawn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct StatusMarker {
    pub condition: String,
    pub shape: String,
    pub color: String,
    pub description: String,
    pub transparent: bool,
}

/// `AI` and `AI?`: an image definition, or a request for one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ImageDefinition {
    pub name: String,
    pub sizes: Vec<ImageInstance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub animation: Option<ImageAnimation>,
}

/// One zoom level of an image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ImageInstance {
    pub zoom: f64,
    pub is_local_file: bool,
    pub file: String,
}

/// Frame timing for an animated image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ImageAnimation {
    pub frames: u32,
    pub frame_speed: u32,
    pub loops: u32,
}

/// `AV`: scroll the map view to a grid position (fractions of the
/// whole map).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AdjustView {
    pub grid_x: f64,
    pub grid_y: f64,
}

/// `CLR`: remove objects. `obj_id` is an ID, a creature name, or one of
/// the wildcard forms the application defines (`*`, `E*`, `M*`, `P*`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Clear {
    #[serde(rename = "ObjID")]
    pub obj_id: String,
}

/// `CLR@`: remove the objects that were loaded from a map file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ClearFrom {
    pub file_def: String,
}

/// `L`: load a map file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LoadFrom {
    pub file_def: String,
    pub is_local_file: bool,
    pub cache_only: bool,
    pub merge: bool,
}

/// `CO`: turn combat mode on or off.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CombatMode {
    pub enabled: bool,
}

/// `CS`: set the game clock.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct UpdateClock {
    pub absolute: f64,
    pub relative: f64,
    pub running: bool,
}

/// `I`: whose turn it is, and the elapsed game time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct UpdateTurn {
    #[serde(rename = "ActorID")]
    pub actor_id: String,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
    pub rounds: i64,
    pub count: i64,
}

/// `IL`: the initiative order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct UpdateInitiative {
    pub initiative_list: Vec<InitiativeSlot>,
}

/// One creature's place in the initiative order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct InitiativeSlot {
    pub slot: i64,
    #[serde(rename = "CurrentHP")]
    pub current_hp: i64,
    pub name: String,
    pub is_holding: bool,
    pub has_readied_action: bool,
    pub is_flat_footed: bool,
}

/// `MARK`: flash a marker at a map location.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Mark {
    pub x: f64,
    pub y: f64,
}

/// `OA`: change attributes of an existing object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct UpdateObjAttributes {
    #[serde(rename = "ObjID")]
    pub obj_id: String,
    pub new_attrs: Attributes,
}

/// `OA+` and `OA-`: add values to, or remove values from, a list-valued
/// attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ObjAttributeValues {
    #[serde(rename = "ObjID")]
    pub obj_id: String,
    pub attr_name: String,
    pub values: Vec<String>,
}

// ---------------------------------------------------------------------------
// Receive-side diagnostics
// ---------------------------------------------------------------------------

/// A recognised command word whose body failed to decode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeFailure {
    /// The command word that was recognised.
    pub command: String,
    /// The underlying decoder error, rendered as text.
    pub cause: String,
}

/// A command word that isn't in the table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnknownCommand {
    pub command: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_take_zero_values() {
        let msg: ChatMessage = serde_json::from_str(r#"{"Text":"hi"}"#).unwrap();
        assert_eq!(msg.text, "hi");
        assert!(msg.recipients.is_empty());
        assert!(!msg.to_all);
        assert_eq!(msg.message_id, 0);
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let g: Granted =
            serde_json::from_str(r#"{"User":"alice","Colour":"red"}"#).unwrap();
        assert_eq!(g.user, "alice");
    }

    #[test]
    fn test_field_names_are_pascal_case_with_acronyms() {
        let clr = Clear { obj_id: "abc".into() };
        let json = serde_json::to_value(&clr).unwrap();
        assert_eq!(json["ObjID"], "abc");

        let chat = ChatMessage {
            to_gm: true,
            message_id: 7,
            ..ChatMessage::default()
        };
        let json = serde_json::to_value(&chat).unwrap();
        assert_eq!(json["ToGM"], true);
        assert_eq!(json["MessageID"], 7);
    }

    #[test]
    fn test_challenge_omits_missing_nonce() {
        let c = Challenge {
            protocol: 411,
            challenge: None,
            server_version: "1.0".into(),
        };
        let json = serde_json::to_string(&c).unwrap();
        assert!(!json.contains("Challenge\""), "got {json}");
    }

    #[test]
    fn test_map_object_keeps_opaque_attributes() {
        let json = r##"{"ID":"e1","X":10.5,"Fill":"#ff0000","Points":[{"X":1,"Y":2}]}"##;
        let obj: MapObject = serde_json::from_str(json).unwrap();

        assert_eq!(obj.id, "e1");
        assert_eq!(obj.attributes["Fill"], "#ff0000");
        assert_eq!(obj.attributes["X"], 10.5);
        assert!(!obj.attributes.contains_key("ID"));
    }

    #[test]
    fn test_empty_payload_serializes_as_empty_object() {
        assert_eq!(serde_json::to_string(&Marco {}).unwrap(), "{}");
        assert_eq!(serde_json::to_string(&Ready {}).unwrap(), "{}");
    }
}
