//! Wire protocol between clients and the authoritative server.
//!
//! Packets are encoded with bincode. Transport framing is the server's
//! concern; this module only knows typed messages.

use crate::{MAP_SIZE, MAX_CHAT_LENGTH, MAX_PLAYERS, TILE_SIZE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub type PlayerId = u32;
pub type Team = u8;

/// Work a builder can be sent to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildAction {
    Harvest,
    BuildRoad,
    BuildWall,
    BuildBoat,
    Repair,
    PlacePillbox,
    LayMine,
}

impl BuildAction {
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0 => Some(BuildAction::Harvest),
            1 => Some(BuildAction::BuildRoad),
            2 => Some(BuildAction::BuildWall),
            3 => Some(BuildAction::BuildBoat),
            4 => Some(BuildAction::Repair),
            5 => Some(BuildAction::PlacePillbox),
            6 => Some(BuildAction::LayMine),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Build order as it arrives from a client, before validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BuildOrderFrame {
    pub action: u8,
    /// Target in world units.
    pub x: f32,
    pub y: f32,
}

/// A validated one-shot build order targeting a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOrder {
    pub action: BuildAction,
    pub tile_x: u16,
    pub tile_y: u16,
}

impl BuildOrderFrame {
    /// Clamps the target into the map and rejects unknown actions or non-finite coordinates.
    pub fn validate(&self) -> Option<BuildOrder> {
        let action = BuildAction::from_u8(self.action)?;
        if !self.x.is_finite() || !self.y.is_finite() {
            return None;
        }
        let max_tile = (MAP_SIZE - 1) as f32;
        let tile_x = (self.x / TILE_SIZE).floor().clamp(0.0, max_tile) as u16;
        let tile_y = (self.y / TILE_SIZE).floor().clamp(0.0, max_tile) as u16;
        Some(BuildOrder {
            action,
            tile_x,
            tile_y,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RangeAdjust {
    Decrease,
    #[default]
    Hold,
    Increase,
}

/// One input frame from a player (or a bot, after translation).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InputState {
    pub sequence: u32,
    pub tick: u32,
    pub accelerate: bool,
    pub decelerate: bool,
    pub turn_left: bool,
    pub turn_right: bool,
    pub shoot: bool,
    pub range: RangeAdjust,
    pub build: Option<BuildOrderFrame>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllianceAction {
    Request { team: Team },
    Accept { team: Team },
    Cancel { team: Team },
    /// Ends the alliance with one named partner team.
    Break { team: Team },
    /// Ends whatever alliance the team is in.
    Leave,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientPacket {
    Input(InputState),
    Chat {
        text: String,
        alliance_only: bool,
        recipients: Option<Vec<PlayerId>>,
    },
    Alliance(AllianceAction),
    Disconnect,
}

/// Reason attached to a server-side connection close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    ServerFull,
    TooManyConnections,
    TooManyInvalidMessages,
    Timeout,
    ClientRequested,
    ServerShutdown,
}

impl CloseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            CloseReason::ServerFull => "server full",
            CloseReason::TooManyConnections => "too many connections from this address",
            CloseReason::TooManyInvalidMessages => "too many invalid messages",
            CloseReason::Timeout => "connection timed out",
            CloseReason::ClientRequested => "client requested disconnect",
            CloseReason::ServerShutdown => "server shutting down",
        }
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TankSnapshot {
    pub id: u32,
    pub player_id: PlayerId,
    pub team: Team,
    pub x: f32,
    pub y: f32,
    pub direction: u8,
    pub speed: f32,
    pub armor: u8,
    pub shells: u8,
    pub mines: u8,
    pub trees: u8,
    pub on_boat: bool,
    pub reload: u8,
    pub firing_range: f32,
    pub alive: bool,
    pub carrying_pillbox: bool,
}

impl TankSnapshot {
    /// Hides the fields an opponent must not learn.
    pub fn redacted(mut self) -> Self {
        self.shells = 0;
        self.mines = 0;
        self.trees = 0;
        self.reload = 0;
        self.firing_range = 0.0;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShellSnapshot {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub direction: u8,
    /// Positive for a tank id, negative for `-pillbox_id`.
    pub owner: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuilderState {
    InTank,
    Parachuting,
    Waiting,
    Returning,
    Harvesting,
    BuildingRoad,
    BuildingWall,
    BuildingBoat,
    Repairing,
    PlacingPillbox,
    LayingMine,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuilderSnapshot {
    pub id: u32,
    pub owner_tank: u32,
    pub x: f32,
    pub y: f32,
    pub state: BuilderState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PillboxSnapshot {
    pub id: u32,
    pub tile_x: u16,
    pub tile_y: u16,
    pub armor: u8,
    pub owner_team: Team,
    pub in_tank: bool,
    pub reload: u8,
    pub fire_interval: u8,
}

impl PillboxSnapshot {
    pub fn redacted(mut self) -> Self {
        self.reload = 0;
        self.fire_interval = 0;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseSnapshot {
    pub id: u32,
    pub tile_x: u16,
    pub tile_y: u16,
    pub armor: u8,
    pub shells: u8,
    pub mines: u8,
    pub owner_team: Team,
}

impl BaseSnapshot {
    pub fn redacted(mut self) -> Self {
        self.shells = 0;
        self.mines = 0;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TerrainUpdate {
    pub x: u16,
    pub y: u16,
    pub terrain: u8,
    pub life: u8,
    /// Only set when the receiving team may see the mine.
    pub mine: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SoundKind {
    ShotFired,
    ShotBuilding,
    ShotTree,
    HitTank,
    TankSunk,
    TankExplode,
    Explosion,
    MineExplosion,
    Bubbles,
    BuildComplete,
    BuilderKilled,
    PillboxFire,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SoundEvent {
    pub kind: SoundKind,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HudKind {
    Chat,
    Alliance,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HudMessage {
    pub kind: HudKind,
    pub from: Option<PlayerId>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllianceSnapshot {
    pub teams: Vec<Team>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WelcomeMessage {
    pub player_id: PlayerId,
    pub team: Team,
    pub tick: u32,
    pub map_name: String,
    /// Row-major terrain codes, `MAP_SIZE * MAP_SIZE` entries.
    pub terrain: Vec<u8>,
    pub terrain_life: Vec<u8>,
    /// Mines this player's team is allowed to see, as tile coordinates.
    pub mines: Vec<(u16, u16)>,
    pub tanks: Vec<TankSnapshot>,
    pub pillboxes: Vec<PillboxSnapshot>,
    pub bases: Vec<BaseSnapshot>,
    pub alliances: Option<Vec<AllianceSnapshot>>,
    pub match_ended: Option<bool>,
    pub winning_teams: Option<Vec<Team>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UpdateMessage {
    pub tick: u32,
    pub tanks: Vec<TankSnapshot>,
    pub shells: Vec<ShellSnapshot>,
    pub builders: Vec<BuilderSnapshot>,
    pub pillboxes: Vec<PillboxSnapshot>,
    pub bases: Vec<BaseSnapshot>,
    pub removed_tank_ids: Vec<u32>,
    pub removed_shell_ids: Vec<u32>,
    pub removed_builder_ids: Vec<u32>,
    pub terrain: Vec<TerrainUpdate>,
    pub sounds: Vec<SoundEvent>,
    pub hud: Vec<HudMessage>,
    pub match_ended: Option<bool>,
    pub winning_teams: Option<Vec<Team>>,
}

impl UpdateMessage {
    pub fn new(tick: u32) -> Self {
        Self {
            tick,
            ..Default::default()
        }
    }

    /// True when there is nothing worth sending besides the tick number.
    pub fn is_empty(&self) -> bool {
        self.tanks.is_empty()
            && self.shells.is_empty()
            && self.builders.is_empty()
            && self.pillboxes.is_empty()
            && self.bases.is_empty()
            && self.removed_tank_ids.is_empty()
            && self.removed_shell_ids.is_empty()
            && self.removed_builder_ids.is_empty()
            && self.terrain.is_empty()
            && self.sounds.is_empty()
            && self.hud.is_empty()
            && self.match_ended.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerPacket {
    Welcome(Box<WelcomeMessage>),
    Update(UpdateMessage),
    Disconnected { reason: CloseReason },
}

pub fn encode_packet<T: Serialize>(packet: &T) -> Result<Vec<u8>, bincode::Error> {
    bincode::serialize(packet)
}

pub fn decode_packet<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, bincode::Error> {
    bincode::deserialize(bytes)
}

/// Normalises inbound chat text: trims, truncates to the maximum length and
/// drops messages that are empty after trimming.
pub fn sanitize_chat(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_CHAT_LENGTH).collect())
}

/// Caps an explicit recipient list to the player limit.
pub fn cap_recipients(recipients: Vec<PlayerId>) -> Vec<PlayerId> {
    let mut recipients = recipients;
    recipients.truncate(MAX_PLAYERS);
    recipients
}
