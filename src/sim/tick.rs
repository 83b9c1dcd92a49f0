//! Fixed timestep simulation tick
//!
//! Advances every ball, the paddle, projectiles, falling items and effect
//! timers in a fixed order so runs replay exactly.

use glam::Vec2;

use super::ball::{Ball, BallTickContext};
use super::collision::{ball_ball_contact, ball_ball_response, reflect_off_surface};
use super::effects;
use super::events::GameEvent;
use super::geometry::SweptHit;
use super::level::{BallResponse, PieceKind};
use super::paddle::PaddleTypes;
use super::state::{GamePhase, GameState};
use crate::consts::*;

/// Input commands for a single tick (deterministic)
#[derive(Debug, Clone, Default)]
pub struct TickInput {
    /// Paddle velocity along x for this tick (units/s)
    pub paddle_velocity: f32,
    /// Fire button: releases a held ball or fires the paddle's weapon
    pub shoot: bool,
    /// Pause toggle
    pub pause: bool,
}

/// What a ball ran into first this tick
enum Contact {
    Wall(SweptHit),
    Paddle(SweptHit),
    Piece(usize, SweptHit),
}

impl Contact {
    fn toi(&self) -> f32 {
        match self {
            Contact::Wall(hit) | Contact::Paddle(hit) | Contact::Piece(_, hit) => hit.toi,
        }
    }
}

/// Advance the game state by one fixed timestep
pub fn tick(state: &mut GameState, input: &TickInput, dt: f32) {
    if input.pause {
        match state.phase {
            GamePhase::Playing | GamePhase::Serve => {
                state.resume_phase = state.phase;
                state.phase = GamePhase::Paused;
                return;
            }
            GamePhase::Paused => {
                state.phase = state.resume_phase;
            }
            _ => {}
        }
    }

    match state.phase {
        GamePhase::Paused | GamePhase::GameOver | GamePhase::LevelComplete => return,
        _ => {}
    }

    state.time_ticks += 1;

    state.paddle.set_velocity_x(input.paddle_velocity);
    state.paddle.tick(dt);
    if input.shoot {
        state.shoot();
    }

    update_balls(state, dt);
    fire_cannons(state, dt);
    collide_balls(state);
    update_projectiles(state, dt);
    update_items(state, dt);
    update_timers(state, dt);
    remove_dead_balls(state);

    if state.phase != GamePhase::GameOver && state.level.is_complete() {
        state.phase = GamePhase::LevelComplete;
        state.push_event(GameEvent::LevelComplete);
        log::info!("Level complete with score {}", state.score);
    }

    state.normalize_order();
}

fn update_balls(state: &mut GameState, dt: f32) {
    let attached_id = state.paddle.attached().map(|a| a.ball_id);
    let magnet_target = state
        .paddle
        .has_type(PaddleTypes::MAGNET)
        .then(|| state.paddle.center());

    for i in 0..state.balls.len() {
        let attached = attached_id == Some(state.balls[i].id);
        let ctx = BallTickContext {
            gravity_dir: state.gravity_dir,
            level_size: state.level.size(),
            attached,
            magnet_target: if attached { None } else { magnet_target },
        };

        let start = state.balls[i].center();
        let spawned = state.balls[i].tick(dt, &ctx, &mut state.rng);
        for projectile in spawned {
            state.spawn_projectile(projectile);
        }

        if attached {
            if let Some(center) = state.paddle.attached_ball_center() {
                state.balls[i].set_center(center);
            }
            continue;
        }
        if state.balls[i].is_loaded_in_cannon() {
            continue;
        }

        let displacement = state.balls[i].center() - start;
        state.balls[i].set_center(start);
        resolve_ball_motion(state, i, displacement);
        update_portal(state, i);
    }
}

/// Move a ball along its displacement, stopping at and reacting to the
/// first surface in the way. At most one collision is handled per tick.
fn resolve_ball_motion(state: &mut GameState, i: usize, displacement: Vec2) {
    let ball = &state.balls[i];
    let circle = ball.bounds();

    let mut contact = state
        .level
        .walls()
        .collide(&circle, displacement)
        .map(Contact::Wall);
    let mut consider = |candidate: Option<Contact>| {
        if let Some(c) = candidate {
            if contact.as_ref().is_none_or(|best| c.toi() < best.toi()) {
                contact = Some(c);
            }
        }
    };
    if ball.paddle_gate.is_open() {
        consider(
            state
                .paddle
                .world_bounds()
                .collide(&circle, displacement)
                .map(Contact::Paddle),
        );
    }
    if ball.block_gate.is_open() {
        consider(
            state
                .level
                .ball_collision(ball, displacement)
                .map(|(index, hit)| Contact::Piece(index, hit)),
        );
    }

    match contact {
        None => {
            let ball = &mut state.balls[i];
            ball.set_center(ball.center() + displacement);
        }
        Some(Contact::Wall(hit)) => {
            let ball = &mut state.balls[i];
            ball.set_center(hit.contact_center);
            bounce(ball, hit.normal);
            ball.last_piece = None;
        }
        Some(Contact::Paddle(hit)) => hit_paddle(state, i, &hit),
        Some(Contact::Piece(index, hit)) => hit_piece(state, i, index, displacement, &hit),
    }
}

fn bounce(ball: &mut Ball, normal: Vec2) {
    let dir = reflect_off_surface(ball.direction(), normal);
    if let Err(e) = ball.set_direction(dir) {
        log::warn!("Ball {} kept its direction: {}", ball.id, e);
    }
    ball.mark_collision();
}

fn hit_paddle(state: &mut GameState, i: usize, hit: &SweptHit) {
    let sticky = state.paddle.has_type(PaddleTypes::STICKY) && !state.paddle.has_attached_ball();
    let ball = &mut state.balls[i];
    let ball_id = ball.id;
    ball.set_center(hit.contact_center);
    ball.last_piece = None;

    if sticky && state.paddle.attach_ball(ball) {
        state.push_event(GameEvent::BallAttached { ball_id });
        log::debug!("Ball {} stuck to the paddle", ball_id);
        return;
    }

    let dir = state.paddle.deflect(ball.direction(), hit.normal);
    if let Err(e) = ball.set_direction(dir) {
        log::warn!("Ball {} kept its direction: {}", ball_id, e);
    }
    ball.mark_collision();
    ball.paddle_gate.close_for(PADDLE_HIT_GATE_SECS);
    state.push_event(GameEvent::BallPaddleHit { ball_id });
}

fn hit_piece(state: &mut GameState, i: usize, index: usize, displacement: Vec2, hit: &SweptHit) {
    let Some(piece_id) = state.level.piece_at_index(index).map(|p| p.id) else {
        return;
    };
    let ball_types = state.balls[i].types();
    let reaction = state.level.ball_hit(index, ball_types, &mut state.rng);
    let ball_id = state.balls[i].id;
    log::debug!("Ball {} hit piece {}: {:?}", ball_id, piece_id, reaction.response);

    match reaction.response {
        BallResponse::Reflect => {
            let ball = &mut state.balls[i];
            ball.set_center(hit.contact_center);
            bounce(ball, hit.normal);
            ball.last_piece = Some(piece_id);
        }
        BallResponse::PassThrough => {
            let ball = &mut state.balls[i];
            ball.set_center(ball.center() + displacement);
            ball.last_piece = Some(piece_id);
            ball.mark_collision();
        }
        BallResponse::Phase => {
            let ball = &mut state.balls[i];
            ball.set_center(ball.center() + displacement);
            ball.start_ghosting();
            state.push_event(GameEvent::BallPhasedThrough { ball_id, piece_id });
        }
        BallResponse::Capture { piece_id, center } => {
            if state.level.load_cannon(piece_id, ball_id, &mut state.rng) {
                state.balls[i].load_into_cannon(piece_id, center);
                state.push_event(GameEvent::BallLoadedInCannon { ball_id, piece_id });
            } else {
                let ball = &mut state.balls[i];
                ball.set_center(hit.contact_center);
                bounce(ball, hit.normal);
                ball.last_piece = Some(piece_id);
            }
        }
        BallResponse::Drop => {
            let gravity = state.gravity_dir;
            let ball = &mut state.balls[i];
            ball.set_center(hit.contact_center);
            if let Err(e) = ball.set_direction(gravity) {
                log::warn!("Ball {} kept its direction: {}", ball_id, e);
            }
            ball.block_gate.close_for(NET_BLOCK_GATE_SECS);
            ball.last_piece = Some(piece_id);
            ball.mark_collision();
            state.push_event(GameEvent::BallCaughtByNet { ball_id, piece_id });
        }
    }

    state.apply_piece_changes(&reaction.changes, &reaction.item_drops);
}

/// Teleport a ball that has entered a portal it did not just come out of
fn update_portal(state: &mut GameState, i: usize) {
    let center = state.balls[i].center();
    let portal = state
        .level
        .piece_at(center)
        .filter(|p| matches!(p.kind, PieceKind::Portal { .. }))
        .map(|p| (p.id, p.center));

    let ball = &mut state.balls[i];
    let Some((portal_id, portal_center)) = portal else {
        ball.portal_lock = None;
        return;
    };
    if ball.portal_lock == Some(portal_id) {
        return;
    }
    let Some((sibling_id, sibling_center)) = state
        .level
        .portal_sibling(portal_id)
        .map(|s| (s.id, s.center))
    else {
        return;
    };

    let ball = &mut state.balls[i];
    ball.set_center(sibling_center + (center - portal_center));
    ball.portal_lock = Some(sibling_id);
    let ball_id = ball.id;
    state.push_event(GameEvent::BallTeleported {
        ball_id,
        from_piece: portal_id,
        to_piece: sibling_id,
    });
}

fn fire_cannons(state: &mut GameState, dt: f32) {
    for fire in state.level.tick_cannons(dt) {
        let Some(ball) = state.ball_mut(fire.ball_id) else {
            continue;
        };
        match ball.fire_from_cannon(fire.center, fire.dir) {
            Ok(()) => state.push_event(GameEvent::BallFiredFromCannon {
                ball_id: fire.ball_id,
                piece_id: fire.piece_id,
            }),
            Err(e) => log::warn!("Cannon {} misfired: {}", fire.piece_id, e),
        }
    }
}

/// Pairwise ball bounces, lower id first
fn collide_balls(state: &mut GameState) {
    let attached_id = state.paddle.attached().map(|a| a.ball_id);
    let free = |b: &Ball| {
        b.ball_ball_gate.is_open() && !b.is_loaded_in_cannon() && Some(b.id) != attached_id
    };

    for i in 0..state.balls.len() {
        for j in (i + 1)..state.balls.len() {
            let (left, right) = state.balls.split_at_mut(j);
            let (a, b) = (&mut left[i], &mut right[0]);
            if !free(a) || !free(b) {
                continue;
            }
            let Some(contact) = ball_ball_contact(&a.bounds(), &b.bounds()) else {
                continue;
            };
            let (a_dir, b_dir) = ball_ball_response(a.direction(), b.direction(), &contact);
            if a.set_direction(a_dir).is_err() || b.set_direction(b_dir).is_err() {
                continue;
            }
            let push = contact.normal * (contact.penetration * 0.5);
            a.set_center(a.center() + push);
            b.set_center(b.center() - push);
            a.mark_collision();
            b.mark_collision();
            let (a_id, b_id) = (a.id, b.id);
            state.push_event(GameEvent::BallBallHit { a: a_id, b: b_id });
        }
    }
}

fn update_projectiles(state: &mut GameState, dt: f32) {
    let level_size = state.level.size();
    let mut projectiles = std::mem::take(&mut state.projectiles);
    projectiles.retain_mut(|projectile| {
        projectile.tick(dt);
        if projectile.is_out_of_bounds(level_size) {
            return false;
        }
        let Some(index) = state.level.projectile_collision(&projectile.aabb()) else {
            return true;
        };
        let reaction = state.level.projectile_hit(index, projectile.kind);
        state.apply_projectile_reaction(&reaction);
        !reaction.consumed
    });
    projectiles.append(&mut state.projectiles);
    state.projectiles = projectiles;
}

fn update_items(state: &mut GameState, dt: f32) {
    let faded = state.camera_active();
    let mut items = std::mem::take(&mut state.items);
    let mut caught = Vec::new();
    items.retain_mut(|item| {
        item.set_camera_faded(faded);
        item.tick(dt, &state.level);
        if item.collides_with_paddle(&state.paddle) {
            caught.push(item.clone());
            return false;
        }
        !item.is_below_level()
    });
    items.append(&mut state.items);
    state.items = items;

    for item in caught {
        effects::acquire_item(state, item);
    }
}

fn update_timers(state: &mut GameState, dt: f32) {
    let expired: Vec<_> = state
        .timers
        .iter_mut()
        .filter_map(|timer| timer.tick(dt))
        .collect();
    state.timers.retain(|t| t.is_running());
    for deactivation in &expired {
        effects::deactivate(state, deactivation);
    }
}

fn remove_dead_balls(state: &mut GameState) {
    let dead: Vec<u32> = state
        .balls
        .iter()
        .filter(|b| !b.is_loaded_in_cannon() && b.center().y < Y_COORD_OF_DEATH)
        .map(|b| b.id)
        .collect();
    if dead.is_empty() {
        return;
    }
    for id in dead {
        state.remove_ball(id);
    }
    if state.balls.is_empty() {
        state.lose_life();
    }
}
