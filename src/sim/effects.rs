//! Item effect resolution
//!
//! Picking up an item either refreshes an effect of the same kind, cancels
//! out an opposing effect, or applies a new one. Timed effects get an
//! [`ItemTimer`]; instant ones report a zero duration and are never reverted.

use glam::Vec2;

use super::ball::BallSpeed;
use super::events::GameEvent;
use super::item::{EffectCategory, GameItem, ItemKind};
use super::state::{GameState, GamePhase};
use super::timer::{Deactivation, ItemTimer};
use crate::consts::*;
use crate::rotate_deg;

/// Duration reported by instant and cancelled effects
pub const ZERO_TIME_TIMER_SECS: f32 = 0.0;

/// The paddle caught an item. Returns how long its effect lasts.
pub fn acquire_item(state: &mut GameState, item: GameItem) -> f32 {
    let kind = item.kind;
    state.push_event(GameEvent::ItemAcquired {
        item_id: item.id,
        kind,
    });

    // An opposing effect and the new item annihilate each other
    if let Some(opposing) = kind.opposing() {
        if let Some(pos) = state
            .timers
            .iter()
            .position(|t| t.kind() == opposing && t.is_running())
        {
            let mut timer = state.timers.remove(pos);
            if let Some(deactivation) = timer.cancel_and_deactivate() {
                deactivate(state, &deactivation);
            }
            state.push_event(GameEvent::ItemEffectsCancelled {
                acquired: kind,
                cancelled: opposing,
            });
            log::info!("{:?} cancelled out {:?}", kind, opposing);
            return ZERO_TIME_TIMER_SECS;
        }
    }

    // Same kind: the old timer hands over to the new one without reverting
    state.timers.retain_mut(|t| {
        if t.kind() == kind {
            t.cancel_silently();
            false
        } else {
            true
        }
    });

    let duration = activate(state, kind);
    state.push_event(GameEvent::ItemActivated { kind, duration });
    log::info!("Activated {:?} for {:.1}s", kind, duration);

    if duration > ZERO_TIME_TIMER_SECS {
        let balls = if kind.category() == EffectCategory::Ball {
            state.balls.iter().map(|b| b.id).collect()
        } else {
            Vec::new()
        };
        let timer_id = state.next_entity_id();
        state
            .timers
            .push(ItemTimer::new(timer_id, item, duration, balls));
        state.push_event(GameEvent::TimerStarted {
            timer_id,
            kind,
            duration,
        });
    }
    duration
}

/// Apply an item's effect. Returns the effect duration, zero for instant ones.
pub fn activate(state: &mut GameState, kind: ItemKind) -> f32 {
    if let Some(flag) = kind.ball_type() {
        for ball in &mut state.balls {
            ball.add_type(flag);
        }
        return state.tuning.ball_effect_secs;
    }
    if let Some(flag) = kind.paddle_type() {
        state.paddle.add_type(flag);
        return state.tuning.paddle_effect_secs;
    }

    match kind {
        ItemKind::PaddleCam => {
            state.paddle.set_camera_active(true);
            state.tuning.camera_effect_secs
        }
        ItemKind::BallCam => match state.balls.first() {
            Some(ball) => {
                state.ball_cam = Some(ball.id);
                state.tuning.camera_effect_secs
            }
            None => ZERO_TIME_TIMER_SECS,
        },
        ItemKind::BallSpeedUp => {
            for ball in &mut state.balls {
                ball.increase_speed();
            }
            ZERO_TIME_TIMER_SECS
        }
        ItemKind::BallSpeedDown => {
            for ball in &mut state.balls {
                ball.decrease_speed();
            }
            ZERO_TIME_TIMER_SECS
        }
        ItemKind::BallGrow => {
            for ball in &mut state.balls {
                ball.increase_size();
            }
            ZERO_TIME_TIMER_SECS
        }
        ItemKind::BallShrink => {
            for ball in &mut state.balls {
                ball.decrease_size();
            }
            ZERO_TIME_TIMER_SECS
        }
        ItemKind::PaddleGrow => {
            state.paddle.increase_size();
            ZERO_TIME_TIMER_SECS
        }
        ItemKind::PaddleShrink => {
            state.paddle.decrease_size();
            ZERO_TIME_TIMER_SECS
        }
        ItemKind::MultiBall3 => {
            multiball(state, 2);
            ZERO_TIME_TIMER_SECS
        }
        ItemKind::MultiBall5 => {
            multiball(state, 4);
            ZERO_TIME_TIMER_SECS
        }
        ItemKind::OneUp => {
            if state.lives < MAX_LIVES {
                state.lives += 1;
            }
            state.push_event(GameEvent::LifeGained { lives: state.lives });
            ZERO_TIME_TIMER_SECS
        }
        // Ball and paddle modifiers returned above
        _ => ZERO_TIME_TIMER_SECS,
    }
}

/// Revert a timed effect on everything it was applied to
pub fn deactivate(state: &mut GameState, deactivation: &Deactivation) {
    let kind = deactivation.kind;
    if let Some(flag) = kind.ball_type() {
        for id in &deactivation.balls {
            if let Some(ball) = state.ball_mut(*id) {
                ball.remove_type(flag);
            }
        }
    } else if let Some(flag) = kind.paddle_type() {
        state.paddle.remove_type(flag);
        // A ball held by the sticky paddle is let go when the glue wears off
        if kind == ItemKind::StickyPaddle && state.phase == GamePhase::Playing {
            if let Some(attached) = state.paddle.attached() {
                state.release_attached_ball(attached.ball_id);
            }
        }
    } else {
        match kind {
            ItemKind::PaddleCam => state.paddle.set_camera_active(false),
            ItemKind::BallCam => state.ball_cam = None,
            _ => {}
        }
    }

    state.push_event(GameEvent::ItemDeactivated { kind });
    state.push_event(GameEvent::TimerStopped {
        timer_id: deactivation.timer_id,
        kind,
    });
    log::info!("Deactivated {:?}", kind);
}

/// Split the first ball into `count` extra copies fanned out around its
/// direction. Copies inherit every timed effect of the original.
pub fn multiball(state: &mut GameState, count: u32) {
    let Some(source) = state.balls.first().cloned() else {
        return;
    };
    let dir = if source.is_stationary() {
        Vec2::Y
    } else {
        source.direction()
    };
    let speed = match source.speed_class() {
        BallSpeed::Zero => BallSpeed::Normal,
        s => s,
    };

    let relevant: Vec<usize> = state
        .timers
        .iter()
        .enumerate()
        .filter(|(_, t)| t.is_associated(source.id))
        .map(|(i, _)| i)
        .collect();

    for n in 0..count.min(MAX_NUM_SPLIT_BALLS) {
        let id = state.next_entity_id();
        let mut copy = source.split_copy(id);
        let split_dir = rotate_deg(dir, MIN_SPLIT_DEGS * (n as f32 + 1.0));
        if let Err(e) = copy.set_velocity(speed, split_dir) {
            log::warn!("Skipping split ball: {}", e);
            continue;
        }
        for &i in &relevant {
            state.timers[i].associate_ball(id);
        }
        state.spawn_ball(copy);
    }

    let grace = state.tuning.multiball_grace_secs;
    for ball in &mut state.balls {
        ball.ball_ball_gate.close_for(grace);
    }
    log::info!("Multiball: {} balls in play", state.balls.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::ball::BallTypes;
    use crate::sim::level::Level;
    use crate::sim::paddle::PaddleTypes;
    use crate::tuning::Tuning;

    fn playing_state() -> GameState {
        let level = Level::parse(
            "
            RRRRRRRRR
            .........
            .........
            .........
            .........
            ",
        )
        .unwrap();
        let mut state = GameState::new(7, level, Tuning::default());
        state.shoot();
        state.drain_events();
        state
    }

    fn pick_up(state: &mut GameState, kind: ItemKind) -> f32 {
        let id = state.next_entity_id();
        let item = GameItem::new(id, kind, Vec2::ZERO, 4.0);
        acquire_item(state, item)
    }

    fn running(state: &GameState, kind: ItemKind) -> usize {
        state
            .timers
            .iter()
            .filter(|t| t.kind() == kind && t.is_running())
            .count()
    }

    #[test]
    fn test_fire_cancels_ice() {
        let mut s = playing_state();
        assert!(pick_up(&mut s, ItemKind::IceBall) > 0.0);
        assert!(s.balls[0].has_type(BallTypes::ICE));
        s.drain_events();

        let duration = pick_up(&mut s, ItemKind::FireBall);
        assert_eq!(duration, ZERO_TIME_TIMER_SECS);
        assert_eq!(running(&s, ItemKind::IceBall), 0);
        assert_eq!(running(&s, ItemKind::FireBall), 0);
        assert!(s.balls.iter().all(|b| !b.has_type(BallTypes::FIRE)));
        assert!(s.balls.iter().all(|b| !b.has_type(BallTypes::ICE)));
        assert!(s.drain_events().contains(&GameEvent::ItemEffectsCancelled {
            acquired: ItemKind::FireBall,
            cancelled: ItemKind::IceBall,
        }));
    }

    #[test]
    fn test_blasters_cancel() {
        let mut s = playing_state();
        pick_up(&mut s, ItemKind::FlameBlasterPaddle);
        assert_eq!(pick_up(&mut s, ItemKind::IceBlasterPaddle), 0.0);
        assert!(!s.paddle.has_type(PaddleTypes::FLAME_BLASTER));
        assert!(!s.paddle.has_type(PaddleTypes::ICE_BLASTER));
        assert!(s.timers.is_empty());
    }

    #[test]
    fn test_second_uber_refreshes_timer() {
        let mut s = playing_state();
        pick_up(&mut s, ItemKind::UberBall);
        for timer in &mut s.timers {
            timer.tick(10.0);
        }
        s.drain_events();

        let duration = pick_up(&mut s, ItemKind::UberBall);
        assert_eq!(duration, s.tuning.ball_effect_secs);
        assert_eq!(running(&s, ItemKind::UberBall), 1);
        assert_eq!(s.timers.len(), 1);
        assert_eq!(s.timers[0].elapsed(), 0.0);
        assert!(s.balls[0].has_type(BallTypes::UBER));
        // The replaced timer never reverted anything
        assert!(!s
            .drain_events()
            .iter()
            .any(|e| matches!(e, GameEvent::ItemDeactivated { .. })));
    }

    #[test]
    fn test_multiball_clones_join_timers() {
        let mut s = playing_state();
        pick_up(&mut s, ItemKind::FireBall);
        pick_up(&mut s, ItemKind::MultiBall5);
        assert_eq!(s.balls.len(), 5);
        assert!(s.balls.iter().all(|b| b.has_type(BallTypes::FIRE)));
        let timer = &s.timers[0];
        assert!(s.balls.iter().all(|b| timer.is_associated(b.id)));

        let expire = s.tuning.ball_effect_secs + 1.0;
        let deactivation = s.timers[0].tick(expire).unwrap();
        deactivate(&mut s, &deactivation);
        assert!(s.balls.iter().all(|b| !b.has_type(BallTypes::FIRE)));
    }

    #[test]
    fn test_multiball_fans_out_and_disables_ball_collisions() {
        let mut s = playing_state();
        let original = s.balls[0].direction();
        pick_up(&mut s, ItemKind::MultiBall3);
        assert_eq!(s.balls.len(), 3);
        for ball in &s.balls {
            assert!(!ball.ball_ball_gate.is_open());
            assert!((ball.direction().length() - 1.0).abs() < 1e-4);
        }
        let turned = crate::angle_between_deg(original, s.balls[1].direction());
        assert!((turned - MIN_SPLIT_DEGS).abs() < 6.0);
    }

    #[test]
    fn test_instant_items_have_no_timer() {
        let mut s = playing_state();
        let lives = s.lives;
        assert_eq!(pick_up(&mut s, ItemKind::OneUp), 0.0);
        assert_eq!(s.lives, lives + 1);
        assert_eq!(pick_up(&mut s, ItemKind::BallSpeedUp), 0.0);
        assert_eq!(s.balls[0].speed_class(), BallSpeed::Fast);
        assert!(s.timers.is_empty());
    }

    #[test]
    fn test_paddle_cam_switches_bounds() {
        let mut s = playing_state();
        pick_up(&mut s, ItemKind::PaddleCam);
        assert!(s.paddle.is_camera_active());
        assert!(s.camera_active());
        let deactivation = s.timers[0].cancel_and_deactivate().unwrap();
        deactivate(&mut s, &deactivation);
        assert!(!s.paddle.is_camera_active());
    }

    #[test]
    fn test_sticky_expiry_releases_ball() {
        let mut s = playing_state();
        pick_up(&mut s, ItemKind::StickyPaddle);
        let id = s.balls[0].id;
        let mut ball = s.balls[0].clone();
        s.paddle.attach_ball(&mut ball);
        s.balls[0] = ball;

        let deactivation = s.timers[0].cancel_and_deactivate().unwrap();
        deactivate(&mut s, &deactivation);
        assert!(!s.paddle.has_type(PaddleTypes::STICKY));
        assert!(!s.paddle.has_attached_ball());
        assert!(!s.ball(id).unwrap().is_stationary());
    }
}
