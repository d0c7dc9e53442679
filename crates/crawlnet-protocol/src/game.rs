//! Game announcements: the fixed-size [`GameData`] blob and the
//! `INFO_REPLY` payload layout.
//!
//! ```text
//! ┌──────────────────┬──────────────────────────────────┬───────────────┐
//! │ GameData (22 B)  │ MAX_PLRS × 32 B player names     │ game name     │
//! │                  │ NUL-padded, empty slot = all NUL │ rest, UTF-8   │
//! └──────────────────┴──────────────────────────────────┴───────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::{MAX_PLRS, PacketError};

/// Width of one player-name slot in an announcement.
pub const PLAYER_NAME_LENGTH: usize = 32;

/// Size of the fixed part of an announcement.
pub const INFO_HEADER_SIZE: usize = GameData::SIZE + MAX_PLRS * PLAYER_NAME_LENGTH;

/// Game configuration shared by every participant.
///
/// Serialized as a fixed little-endian layout so it can be embedded in
/// announcements and handed to the simulation as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameData {
    /// Always [`GameData::SIZE`]; lets receivers reject foreign layouts.
    pub size: u32,
    pub program_id: u32,
    pub version_major: u8,
    pub version_minor: u8,
    pub version_patch: u8,
    pub difficulty: u8,
    pub tick_rate: u8,
    pub run_in_town: bool,
    pub theo_quest: bool,
    pub cow_quest: bool,
    pub friendly_fire: bool,
    pub full_quests: bool,
    /// Dungeon generation seed.
    pub seed: u32,
}

impl GameData {
    /// Encoded size in bytes.
    pub const SIZE: usize = 22;

    /// Identifies this program in announcements.
    pub const PROGRAM_ID: u32 = u32::from_le_bytes(*b"CRWL");

    /// Encodes the fixed layout.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.size.to_le_bytes());
        out[4..8].copy_from_slice(&self.program_id.to_le_bytes());
        out[8] = self.version_major;
        out[9] = self.version_minor;
        out[10] = self.version_patch;
        out[11] = self.difficulty;
        out[12] = self.tick_rate;
        out[13] = u8::from(self.run_in_town);
        out[14] = u8::from(self.theo_quest);
        out[15] = u8::from(self.cow_quest);
        out[16] = u8::from(self.friendly_fire);
        out[17] = u8::from(self.full_quests);
        out[18..22].copy_from_slice(&self.seed.to_le_bytes());
        out
    }

    /// Decodes the fixed layout from the start of `bytes`.
    ///
    /// # Errors
    /// Returns [`PacketError::MalformedInfo`] if `bytes` is shorter than
    /// [`GameData::SIZE`] or the embedded size field disagrees with it.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PacketError> {
        let Some(b) = bytes.get(..Self::SIZE) else {
            return Err(PacketError::MalformedInfo(format!(
                "game data needs {} bytes, got {}",
                Self::SIZE,
                bytes.len()
            )));
        };
        let u32_at = |i: usize| u32::from_le_bytes([b[i], b[i + 1], b[i + 2], b[i + 3]]);
        let size = u32_at(0);
        if size as usize != Self::SIZE {
            return Err(PacketError::MalformedInfo(format!(
                "game data size field is {size}"
            )));
        }
        Ok(Self {
            size,
            program_id: u32_at(4),
            version_major: b[8],
            version_minor: b[9],
            version_patch: b[10],
            difficulty: b[11],
            tick_rate: b[12],
            run_in_town: b[13] != 0,
            theo_quest: b[14] != 0,
            cow_quest: b[15] != 0,
            friendly_fire: b[16] != 0,
            full_quests: b[17] != 0,
            seed: u32_at(18),
        })
    }
}

impl Default for GameData {
    fn default() -> Self {
        Self {
            size: Self::SIZE as u32,
            program_id: Self::PROGRAM_ID,
            version_major: 0,
            version_minor: 1,
            version_patch: 0,
            difficulty: 0,
            tick_rate: 20,
            run_in_town: false,
            theo_quest: false,
            cow_quest: false,
            friendly_fire: true,
            full_quests: false,
            seed: 0,
        }
    }
}

/// A game as advertised in an `INFO_REPLY`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameAnnouncement {
    pub game_data: GameData,
    /// Names of the occupied slots, in slot order. Empty slots are skipped.
    pub player_names: Vec<String>,
    pub game_name: String,
}

impl GameAnnouncement {
    /// Builds an announcement payload.
    ///
    /// `game_init_info` is the host's serialized [`GameData`]; it is padded
    /// or cut to [`GameData::SIZE`]. An empty name marks an empty slot.
    /// Names longer than [`PLAYER_NAME_LENGTH`] bytes are cut at a character
    /// boundary.
    pub fn encode(
        game_init_info: &[u8],
        player_names: &[&str; MAX_PLRS],
        game_name: &str,
    ) -> Vec<u8> {
        let mut buf = Vec::with_capacity(INFO_HEADER_SIZE + game_name.len());
        let data_len = game_init_info.len().min(GameData::SIZE);
        buf.extend_from_slice(&game_init_info[..data_len]);
        buf.resize(GameData::SIZE, 0);
        for name in player_names {
            let name = truncate_name(name);
            buf.extend_from_slice(name.as_bytes());
            buf.resize(buf.len() + PLAYER_NAME_LENGTH - name.len(), 0);
        }
        buf.extend_from_slice(game_name.as_bytes());
        buf
    }

    /// Parses an announcement payload.
    ///
    /// # Errors
    /// Returns [`PacketError::MalformedInfo`] if the payload is shorter than
    /// [`INFO_HEADER_SIZE`] or carries a foreign [`GameData`] layout.
    pub fn decode(info: &[u8]) -> Result<Self, PacketError> {
        if info.len() < INFO_HEADER_SIZE {
            return Err(PacketError::MalformedInfo(format!(
                "announcement needs {INFO_HEADER_SIZE} bytes, got {}",
                info.len()
            )));
        }
        let game_data = GameData::from_bytes(info)?;
        let player_names = info[GameData::SIZE..INFO_HEADER_SIZE]
            .chunks_exact(PLAYER_NAME_LENGTH)
            .map(|slot| {
                let len = slot.iter().position(|&b| b == 0).unwrap_or(slot.len());
                String::from_utf8_lossy(&slot[..len]).into_owned()
            })
            .filter(|name| !name.is_empty())
            .collect();
        let game_name = String::from_utf8_lossy(&info[INFO_HEADER_SIZE..]).into_owned();
        Ok(Self {
            game_data,
            player_names,
            game_name,
        })
    }
}

fn truncate_name(name: &str) -> &str {
    if name.len() <= PLAYER_NAME_LENGTH {
        return name;
    }
    let mut end = PLAYER_NAME_LENGTH;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

/// A discovered game as presented to the game browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameInfo {
    pub name: String,
    pub game_data: GameData,
    pub players: Vec<String>,
}
