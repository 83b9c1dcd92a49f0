//! Timed item effects
//!
//! A timer owns the item whose effect it bounds. When it runs out, or is
//! cancelled with deactivation, it hands back a [`Deactivation`] exactly once;
//! the caller reverts the effect from that. A silent cancel never does.

use serde::{Deserialize, Serialize};

use super::item::{GameItem, ItemKind};

/// Instruction to revert an item's effect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deactivation {
    pub timer_id: u32,
    pub kind: ItemKind,
    /// Balls the effect was applied to
    pub balls: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum TimerStatus {
    Running,
    Stopped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemTimer {
    pub id: u32,
    item: GameItem,
    duration: f32,
    elapsed: f32,
    associated_balls: Vec<u32>,
    status: TimerStatus,
}

impl ItemTimer {
    pub fn new(id: u32, item: GameItem, duration: f32, balls: Vec<u32>) -> Self {
        let mut timer = Self {
            id,
            item,
            duration,
            elapsed: 0.0,
            associated_balls: Vec::with_capacity(balls.len()),
            status: TimerStatus::Running,
        };
        for ball in balls {
            timer.associate_ball(ball);
        }
        timer
    }

    pub fn kind(&self) -> ItemKind {
        self.item.kind
    }

    pub fn item(&self) -> &GameItem {
        &self.item
    }

    pub fn duration(&self) -> f32 {
        self.duration
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub fn remaining(&self) -> f32 {
        (self.duration - self.elapsed).max(0.0)
    }

    /// Fraction of the duration used up, for the HUD timer bar
    pub fn progress(&self) -> f32 {
        if self.duration <= 0.0 {
            1.0
        } else {
            (self.elapsed / self.duration).clamp(0.0, 1.0)
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == TimerStatus::Running
    }

    // === Ball association ===

    pub fn associated_balls(&self) -> &[u32] {
        &self.associated_balls
    }

    pub fn is_associated(&self, ball_id: u32) -> bool {
        self.associated_balls.contains(&ball_id)
    }

    pub fn associate_ball(&mut self, ball_id: u32) {
        if !self.is_associated(ball_id) {
            self.associated_balls.push(ball_id);
        }
    }

    pub fn forget_ball(&mut self, ball_id: u32) {
        self.associated_balls.retain(|&b| b != ball_id);
    }

    // === Stopping ===

    /// Advance; on expiry the timer stops and returns its deactivation
    pub fn tick(&mut self, dt: f32) -> Option<Deactivation> {
        if !self.is_running() {
            return None;
        }
        self.elapsed += dt;
        if self.elapsed >= self.duration {
            return self.cancel_and_deactivate();
        }
        None
    }

    /// Stop without reverting the effect (a replacement timer has taken
    /// over). Returns false if already stopped.
    pub fn cancel_silently(&mut self) -> bool {
        let was_running = self.is_running();
        self.status = TimerStatus::Stopped;
        was_running
    }

    /// Stop and revert the effect. Only the first stop yields a deactivation.
    pub fn cancel_and_deactivate(&mut self) -> Option<Deactivation> {
        if !self.is_running() {
            return None;
        }
        self.status = TimerStatus::Stopped;
        Some(Deactivation {
            timer_id: self.id,
            kind: self.item.kind,
            balls: self.associated_balls.clone(),
        })
    }
}
