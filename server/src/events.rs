//! Per-tick effect list.
//!
//! Systems append sounds, HUD lines and tank deaths here instead of calling
//! into each other. The orchestrator drains the list once the tick is done.

use shared::{HudKind, HudMessage, PlayerId, SoundEvent, SoundKind, Team};

/// Who receives a HUD message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HudScope {
    Everyone,
    /// Every team allied with the given one, the team itself included.
    Alliance(Team),
    Players(Vec<PlayerId>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedHud {
    pub scope: HudScope,
    pub message: HudMessage,
}

#[derive(Debug, Clone, Default)]
pub struct TickEvents {
    pub sounds: Vec<SoundEvent>,
    pub hud: Vec<ScopedHud>,
    /// Tanks that died this tick, in the order they died.
    pub deaths: Vec<u32>,
}

impl TickEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sound(&mut self, kind: SoundKind, (x, y): (f32, f32)) {
        self.sounds.push(SoundEvent { kind, x, y });
    }

    pub fn hud(&mut self, scope: HudScope, kind: HudKind, from: Option<PlayerId>, text: String) {
        self.hud.push(ScopedHud {
            scope,
            message: HudMessage { kind, from, text },
        });
    }

    pub fn system(&mut self, scope: HudScope, text: String) {
        self.hud(scope, HudKind::System, None, text);
    }

    pub fn take(&mut self) -> TickEvents {
        std::mem::take(self)
    }
}
