//! Ball kinematics, court collisions and racket hits

use std::collections::{HashMap, VecDeque};

use glam::Vec3;
use serde::Serialize;

use super::mailbox::TickInputs;
use super::{Mode, PlayerId, Team};

pub const GRAVITY: f32 = 9.8;
pub const FLOOR_Y: f32 = 0.1;
/// Vertical velocity multiplier on a floor bounce
pub const FLOOR_RESTITUTION: f32 = -0.8;
pub const BACK_WALL_Z: f32 = 5.0;
/// Crossing this |z| scores for the team defending the other end
pub const SCORE_LINE_Z: f32 = 5.0;
/// Horizontal velocity per unit of swing magnitude
pub const SWING_IMPULSE: f32 = 0.1;
/// Fixed upward velocity added by any racket hit
pub const LIFT_IMPULSE: f32 = 0.5;
pub const RACKET_HEIGHT: f32 = 0.5;
pub const TRAIL_LEN: usize = 30;

pub const SERVE_POSITION: Vec3 = Vec3::new(0.0, 0.5, 0.0);
const SERVE_SPEED_X: f32 = 0.1;
const SERVE_SPEED_Z: f32 = 0.05;

/// Court dimensions per mode
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CourtStats {
    /// Side wall |x|
    pub side_limit: f32,
    /// Ball-to-racket distance that counts as a hit
    pub hit_radius: f32,
}

impl CourtStats {
    pub fn for_mode(mode: Mode) -> Self {
        match mode {
            Mode::Singles => Self {
                side_limit: 5.0,
                hit_radius: 1.2,
            },
            Mode::Doubles => Self {
                side_limit: 10.0,
                hit_radius: 1.0,
            },
        }
    }
}

/// Racket slot positions in roster order
pub fn racket_layout(mode: Mode) -> &'static [Vec3] {
    const DOUBLES: [Vec3; 4] = [
        Vec3::new(-8.0, RACKET_HEIGHT, 3.0),
        Vec3::new(8.0, RACKET_HEIGHT, 3.0),
        Vec3::new(-8.0, RACKET_HEIGHT, -3.0),
        Vec3::new(8.0, RACKET_HEIGHT, -3.0),
    ];
    const SINGLES: [Vec3; 2] = [
        Vec3::new(0.0, RACKET_HEIGHT, 3.0),
        Vec3::new(0.0, RACKET_HEIGHT, -3.0),
    ];
    match mode {
        Mode::Singles => &SINGLES,
        Mode::Doubles => &DOUBLES,
    }
}

/// A recent ball position for trail rendering
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrailPoint {
    pub position: Vec3,
    pub speed: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BallState {
    pub position: Vec3,
    pub velocity: Vec3,
    /// Newest first, at most TRAIL_LEN entries
    pub trail: VecDeque<TrailPoint>,
}

impl BallState {
    pub fn new(position: Vec3, velocity: Vec3) -> Self {
        Self {
            position,
            velocity,
            trail: VecDeque::with_capacity(TRAIL_LEN),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.velocity.is_finite()
    }

    fn push_trail(&mut self) {
        self.trail.push_front(TrailPoint {
            position: self.position,
            speed: self.velocity.length(),
        });
        self.trail.truncate(TRAIL_LEN);
    }
}

impl Default for BallState {
    fn default() -> Self {
        Self::new(SERVE_POSITION, Vec3::new(SERVE_SPEED_X, 0.0, SERVE_SPEED_Z))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Racket {
    pub owner: PlayerId,
    pub team: Team,
    pub position: Vec3,
}

/// Something a renderer may want to show for one tick
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum Effect {
    CourtBounce { at: Vec3 },
    WallBounce { at: Vec3, normal: Vec3 },
    RacketHit { player: PlayerId, at: Vec3, normal: Vec3 },
    PointScored { team: Team },
}

/// Result of advancing the ball by one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutcome {
    pub effects: Vec<Effect>,
    /// Team credited with the point if the ball crossed a scoring line
    pub scored: Option<Team>,
}

/// Ball physics for one tick.
///
/// Order is fixed: gravity, integration, floor, side walls, back walls,
/// racket hits, scoring line.
pub struct PhysicsSystem;

impl PhysicsSystem {
    pub fn step(
        ball: &mut BallState,
        inputs: &TickInputs,
        rackets: &HashMap<PlayerId, Racket>,
        stats: &CourtStats,
        dt: f32,
    ) -> StepOutcome {
        let mut outcome = StepOutcome::default();

        ball.velocity.y -= GRAVITY * dt;
        ball.position += ball.velocity * dt;
        // The scoring line is judged on where the ball got to, not where
        // the back wall puts it
        let crossing_z = ball.position.z;

        if ball.position.y <= FLOOR_Y {
            let at = ball.position;
            ball.position.y = FLOOR_Y;
            ball.velocity.y *= FLOOR_RESTITUTION;
            outcome.effects.push(Effect::CourtBounce { at });
        }

        if ball.position.x.abs() > stats.side_limit {
            let at = ball.position;
            let side = ball.position.x.signum();
            ball.velocity.x = -ball.velocity.x;
            ball.position.x = side * stats.side_limit;
            outcome.effects.push(Effect::WallBounce {
                at,
                normal: Vec3::new(-side, 0.0, 0.0),
            });
        }

        if ball.position.z.abs() > BACK_WALL_Z {
            let at = ball.position;
            let side = ball.position.z.signum();
            ball.velocity.z = -ball.velocity.z;
            ball.position.z = side * BACK_WALL_Z;
            outcome.effects.push(Effect::WallBounce {
                at,
                normal: Vec3::new(0.0, 0.0, -side),
            });
        }

        // Sorted so every peer sums impulses in the same order
        let mut hitters: Vec<(&PlayerId, _)> = inputs.iter().collect();
        hitters.sort_by(|a, b| a.0.cmp(b.0));
        for (player, swing) in hitters {
            let Some(racket) = rackets.get(player) else {
                continue;
            };
            if !swing.is_usable() {
                continue;
            }
            if ball.position.distance(racket.position) < stats.hit_radius {
                let normal = (ball.position - racket.position).normalize_or_zero();
                let angle = swing.angle.to_radians();
                ball.velocity.x += angle.cos() * swing.magnitude * SWING_IMPULSE;
                ball.velocity.z += angle.sin() * swing.magnitude * SWING_IMPULSE;
                ball.velocity.y += LIFT_IMPULSE;
                outcome.effects.push(Effect::RacketHit {
                    player: player.clone(),
                    at: ball.position,
                    normal,
                });
            }
        }

        if crossing_z > SCORE_LINE_Z {
            outcome.scored = Some(Team::One);
        } else if crossing_z < -SCORE_LINE_Z {
            outcome.scored = Some(Team::Two);
        }
        if let Some(team) = outcome.scored {
            outcome.effects.push(Effect::PointScored { team });
        }

        ball.push_trail();
        outcome
    }

    /// Put the ball back at center court, heading away from the server
    pub fn serve(ball: &mut BallState, server: Option<&Racket>, mode: Mode) {
        let direction = match server {
            Some(racket) if racket.position.z > 0.0 => -1.0,
            _ => 1.0,
        };
        ball.position = SERVE_POSITION;
        ball.velocity = match mode {
            Mode::Singles => Vec3::new(0.0, 0.0, SERVE_SPEED_Z * direction),
            Mode::Doubles => Vec3::new(SERVE_SPEED_X, 0.0, SERVE_SPEED_Z * direction),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::swing::SwingSample;

    const DT: f32 = 1.0 / 60.0;

    fn doubles() -> CourtStats {
        CourtStats::for_mode(Mode::Doubles)
    }

    fn racket(owner: &str, position: Vec3) -> Racket {
        Racket {
            owner: owner.into(),
            team: Team::One,
            position,
        }
    }

    fn step(ball: &mut BallState, inputs: &TickInputs, rackets: &HashMap<PlayerId, Racket>) -> StepOutcome {
        PhysicsSystem::step(ball, inputs, rackets, &doubles(), DT)
    }

    #[test]
    fn floor_bounce_clamps_and_reflects_with_damping() {
        let mut ball = BallState::new(Vec3::new(0.0, 0.05, 0.0), Vec3::new(0.0, -1.0, 0.0));
        let outcome = step(&mut ball, &TickInputs::new(), &HashMap::new());

        let downward = 1.0 + GRAVITY * DT;
        assert_eq!(ball.position.y, FLOOR_Y);
        assert!((ball.velocity.y - 0.8 * downward).abs() < 1e-5);
        assert!(matches!(outcome.effects[0], Effect::CourtBounce { .. }));
        assert_eq!(outcome.scored, None);
    }

    #[test]
    fn side_wall_clamps_to_doubles_limit() {
        let mut ball = BallState::new(Vec3::new(10.5, 2.0, 0.0), Vec3::new(1.0, 0.0, 0.0));
        let outcome = step(&mut ball, &TickInputs::new(), &HashMap::new());

        assert_eq!(ball.position.x, 10.0);
        assert_eq!(ball.velocity.x, -1.0);
        assert_eq!(
            outcome.effects,
            vec![Effect::WallBounce {
                at: Vec3::new(10.5 + DT, 2.0 - GRAVITY * DT * DT, 0.0),
                normal: Vec3::new(-1.0, 0.0, 0.0),
            }]
        );
    }

    #[test]
    fn singles_side_limit_is_narrower() {
        let mut ball = BallState::new(Vec3::new(-5.5, 2.0, 0.0), Vec3::new(-1.0, 0.0, 0.0));
        PhysicsSystem::step(
            &mut ball,
            &TickInputs::new(),
            &HashMap::new(),
            &CourtStats::for_mode(Mode::Singles),
            DT,
        );
        assert_eq!(ball.position.x, -5.0);
        assert_eq!(ball.velocity.x, 1.0);
    }

    #[test]
    fn crossing_far_line_scores_even_though_back_wall_clamps() {
        let mut ball = BallState::new(Vec3::new(0.0, 2.0, 4.99), Vec3::new(0.0, 0.0, 3.0));
        let outcome = step(&mut ball, &TickInputs::new(), &HashMap::new());

        assert_eq!(outcome.scored, Some(Team::One));
        assert_eq!(ball.position.z, BACK_WALL_Z);
        assert_eq!(ball.velocity.z, -3.0);
        assert_eq!(outcome.effects.last(), Some(&Effect::PointScored { team: Team::One }));
    }

    #[test]
    fn crossing_near_line_scores_for_team_two() {
        let mut ball = BallState::new(Vec3::new(0.0, 2.0, -4.99), Vec3::new(0.0, 0.0, -3.0));
        let outcome = step(&mut ball, &TickInputs::new(), &HashMap::new());
        assert_eq!(outcome.scored, Some(Team::Two));
    }

    #[test]
    fn racket_in_range_applies_swing_impulse() {
        let mut ball = BallState::new(Vec3::new(0.0, 1.0, 0.0), Vec3::ZERO);
        let rackets = HashMap::from([("a".into(), racket("a", Vec3::new(0.5, 1.0, 0.0)))]);
        let inputs = TickInputs::from([("a".into(), SwingSample::new(90.0, 10.0, 0))]);

        let outcome = step(&mut ball, &inputs, &rackets);

        assert!(ball.velocity.x.abs() < 1e-5);
        assert!((ball.velocity.z - 1.0).abs() < 1e-5);
        assert!((ball.velocity.y - (LIFT_IMPULSE - GRAVITY * DT)).abs() < 1e-5);
        assert!(matches!(&outcome.effects[0], Effect::RacketHit { player, .. } if player.as_str() == "a"));
    }

    #[test]
    fn simultaneous_hits_all_apply() {
        let mut ball = BallState::new(Vec3::new(0.0, 1.0, 0.0), Vec3::ZERO);
        let rackets = HashMap::from([
            ("a".into(), racket("a", Vec3::new(0.5, 1.0, 0.0))),
            ("b".into(), racket("b", Vec3::new(-0.5, 1.0, 0.0))),
        ]);
        let inputs = TickInputs::from([
            ("a".into(), SwingSample::new(0.0, 10.0, 0)),
            ("b".into(), SwingSample::new(0.0, 10.0, 0)),
        ]);

        let outcome = step(&mut ball, &inputs, &rackets);

        assert!((ball.velocity.x - 2.0).abs() < 1e-5);
        assert!((ball.velocity.y - (2.0 * LIFT_IMPULSE - GRAVITY * DT)).abs() < 1e-5);
        assert_eq!(outcome.effects.len(), 2);
    }

    #[test]
    fn out_of_range_or_unusable_swing_is_no_hit() {
        let mut ball = BallState::new(Vec3::new(0.0, 1.0, 0.0), Vec3::ZERO);
        let rackets = HashMap::from([
            ("far".into(), racket("far", Vec3::new(3.0, 1.0, 0.0))),
            ("bad".into(), racket("bad", Vec3::new(0.2, 1.0, 0.0))),
        ]);
        let inputs = TickInputs::from([
            ("far".into(), SwingSample::new(0.0, 10.0, 0)),
            ("bad".into(), SwingSample { angle: f32::NAN, magnitude: 5.0, timestamp: 0 }),
            ("no_racket".into(), SwingSample::new(0.0, 10.0, 0)),
        ]);

        let outcome = step(&mut ball, &inputs, &rackets);
        assert!(outcome.effects.is_empty());
        assert_eq!(ball.velocity.x, 0.0);
    }

    #[test]
    fn serve_heads_away_from_server() {
        let mut ball = BallState::new(Vec3::new(3.0, 0.1, 4.0), Vec3::splat(9.0));
        let far_side = racket("a", Vec3::new(-8.0, RACKET_HEIGHT, 3.0));

        PhysicsSystem::serve(&mut ball, Some(&far_side), Mode::Doubles);
        assert_eq!(ball.position, SERVE_POSITION);
        assert_eq!(ball.velocity, Vec3::new(0.1, 0.0, -0.05));

        PhysicsSystem::serve(&mut ball, None, Mode::Singles);
        assert_eq!(ball.velocity, Vec3::new(0.0, 0.0, 0.05));
    }

    #[test]
    fn trail_is_bounded() {
        let mut ball = BallState::default();
        for _ in 0..100 {
            step(&mut ball, &TickInputs::new(), &HashMap::new());
        }
        assert_eq!(ball.trail.len(), TRAIL_LEN);
        assert_eq!(ball.trail[0].position, ball.position);
    }
}
