//! One draw to the button on the reference engine, from delivery until
//! every stone has stopped.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use curling::game::{Game, MatchSetting, Move, Rotation, Shot};
use curling::simulation::Simple1Setting;
use curling::Vector2;

fn draw_shot(c: &mut Criterion) {
    let setting = MatchSetting {
        randomize_initial_shot_velocity: false,
        ..MatchSetting::default()
    };
    let angle: f32 = 0.0548;
    let shot = Move::Shot(Shot {
        velocity: Vector2::new(angle.sin(), angle.cos()) * 2.4,
        rotation: Rotation::Ccw,
    });

    c.bench_function("draw_shot_simple1", |b| {
        b.iter(|| {
            let mut game = Game::new(setting, &Simple1Setting::default(), Some(0));
            let mut mv = shot;
            black_box(game.apply(&mut mv))
        })
    });
}

criterion_group!(benches, draw_shot);
criterion_main!(benches);
