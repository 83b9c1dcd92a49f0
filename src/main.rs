//! Blammo headless runner
//!
//! Plays a built-in level with a simple autopilot and logs what happens.
//!
//! Usage: `blammo [tuning.json] [seed]`

use std::process::ExitCode;

use blammo::consts::*;
use blammo::sim::{GameEvent, GamePhase, GameState, Level, TickInput, tick};
use blammo::{SimError, Tuning};

const DEMO_LEVEL: &str = "
    SRRRRRRRRRRS
    SOOOBOOBOOOS
    .YYYIYYIYYY.
    ..GGGGGGGG..
    ..N......C..
    .P........P.
    ............
    ............
    ............
    ............
";

/// Simulated display refresh
const FRAME_DT: f32 = 1.0 / 60.0;
/// Give up after this much game time
const MAX_GAME_SECS: f32 = 600.0;

/// Frame-rate independent driver around the fixed-step tick
struct Runner {
    state: GameState,
    accumulator: f32,
    input: TickInput,
}

impl Runner {
    fn new(state: GameState) -> Self {
        Self {
            state,
            accumulator: 0.0,
            input: TickInput::default(),
        }
    }

    /// Run simulation ticks for one frame
    fn update(&mut self, dt: f32) {
        self.accumulator += dt.min(0.1);

        let mut substeps = 0;
        while self.accumulator >= SIM_DT && substeps < MAX_SUBSTEPS {
            self.input = autopilot(&self.state);
            tick(&mut self.state, &self.input, SIM_DT);
            self.accumulator -= SIM_DT;
            substeps += 1;
        }
    }

    fn finished(&self) -> bool {
        matches!(
            self.state.phase,
            GamePhase::GameOver | GamePhase::LevelComplete
        )
    }
}

/// Chase the lowest descending ball and keep firing
fn autopilot(state: &GameState) -> TickInput {
    let paddle_x = state.paddle.center().x;
    let target = state
        .balls
        .iter()
        .filter(|b| b.direction().y < 0.0)
        .min_by(|a, b| a.center().y.total_cmp(&b.center().y))
        .map_or(paddle_x, |b| b.center().x);

    let max = state.paddle.max_speed();
    TickInput {
        paddle_velocity: ((target - paddle_x) * 10.0).clamp(-max, max),
        shoot: true,
        pause: false,
    }
}

fn log_event(event: &GameEvent) {
    match event {
        GameEvent::PieceDamaged { .. } | GameEvent::BallPaddleHit { .. } => {
            log::debug!("{:?}", event)
        }
        _ => log::info!("{:?}", event),
    }
}

fn run() -> Result<(), SimError> {
    let mut args = std::env::args().skip(1);
    let tuning = match args.next() {
        Some(path) => Tuning::load(path)?,
        None => Tuning::default(),
    };
    let seed = args.next().and_then(|s| s.parse().ok()).unwrap_or(42);

    let level = Level::parse(DEMO_LEVEL)?;
    let mut runner = Runner::new(GameState::new(seed, level, tuning));

    let mut elapsed = 0.0;
    while !runner.finished() && elapsed < MAX_GAME_SECS {
        runner.update(FRAME_DT);
        elapsed += FRAME_DT;
        for event in runner.state.drain_events() {
            log_event(&event);
        }
    }

    let state = &runner.state;
    log::info!(
        "Finished in {:?} after {:.1}s ({} ticks): score {}, lives {}",
        state.phase,
        elapsed,
        state.time_ticks,
        state.score,
        state.lives
    );
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Blammo (headless) starting...");

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
