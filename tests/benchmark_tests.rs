//! Performance benchmarks for the simulation and broadcast paths

use server::entities::ShellOwner;
use server::game::GameState;
use server::maps;
use server::visibility::VisibilityBroadcaster;
use shared::{encode_packet, tile_center, InputState, ServerPacket, MAX_PLAYERS};
use std::time::Instant;

fn crowded_game() -> (GameState, Vec<u32>) {
    let mut game = GameState::new(maps::training_ground(), 5);
    game.set_max_bots(8);
    for _ in 0..8 {
        game.add_bot("hunter", None);
    }
    let humans: Vec<u32> = (0..MAX_PLAYERS - 8).map(|_| game.add_player()).collect();
    (game, humans)
}

/// Benchmarks full ticks with a full server of tanks and bots
#[test]
fn benchmark_full_server_ticks() {
    let (mut game, humans) = crowded_game();
    let iterations = 500u32;
    let start = Instant::now();

    for tick in 0..iterations {
        for &id in &humans {
            game.queue_input(
                id,
                InputState {
                    sequence: tick + 1,
                    accelerate: true,
                    turn_left: (tick / 40 + id) % 2 == 0,
                    shoot: tick % 15 == 0,
                    ..Default::default()
                },
            );
        }
        game.tick();
    }

    let duration = start.elapsed();
    println!(
        "Full ticks: {} iterations in {:?} ({:.2} μs/tick)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // A 20 ms tick budget leaves plenty of headroom
    assert!(duration.as_millis() < 5000);
}

/// Benchmarks shell flight and collision with hundreds of shells in the air
#[test]
fn benchmark_shell_storm() {
    let mut game = GameState::new(maps::open_field(), 1);
    for _ in 0..4 {
        game.add_player();
    }
    let shooter = *game.entities.pillboxes.keys().next().unwrap();
    let iterations = 200;
    let start = Instant::now();

    for i in 0..iterations {
        for n in 0..20u16 {
            let x = tile_center(40 + n * 8);
            let y = tile_center(60 + (i as u16 % 100));
            game.entities
                .spawn_shell(x, y, (n * 13) as u8, ShellOwner::Pillbox(shooter), 9.0);
        }
        game.tick();
    }

    let duration = start.elapsed();
    println!(
        "Shell storm: {} ticks in {:?}, {} shells live at the end",
        iterations,
        duration,
        game.entities.shells.len()
    );
    assert!(duration.as_millis() < 5000);
}

/// Benchmarks visibility fan-out and encoding of every player's update
#[test]
fn benchmark_visibility_fanout() {
    let (mut game, humans) = crowded_game();
    let mut broadcaster = VisibilityBroadcaster::new();
    for id in game.players.keys().copied().collect::<Vec<_>>() {
        broadcaster.register(id, &game);
    }

    let iterations = 300u32;
    let mut bytes = 0usize;
    let start = Instant::now();

    for tick in 0..iterations {
        for &id in &humans {
            game.queue_input(
                id,
                InputState {
                    sequence: tick + 1,
                    accelerate: true,
                    shoot: tick % 10 == 0,
                    ..Default::default()
                },
            );
        }
        let output = game.tick();
        for (_, update) in broadcaster.build_updates(&game, &output) {
            bytes += encode_packet(&ServerPacket::Update(update)).unwrap().len();
        }
    }

    let duration = start.elapsed();
    println!(
        "Visibility fan-out: {} ticks in {:?}, {} bytes encoded",
        iterations, duration, bytes
    );
    assert!(bytes > 0);
    assert!(duration.as_millis() < 5000);
}

/// Benchmarks welcome construction, the largest packet the server sends
#[test]
fn benchmark_welcome_encoding() {
    let (game, humans) = crowded_game();
    let iterations = 50;
    let start = Instant::now();

    for _ in 0..iterations {
        for &id in humans.iter().take(4) {
            let welcome = game.welcome_for(id).unwrap();
            let bytes = encode_packet(&ServerPacket::Welcome(Box::new(welcome))).unwrap();
            assert!(bytes.len() > shared::MAP_SIZE * shared::MAP_SIZE);
        }
    }

    let duration = start.elapsed();
    println!("Welcome encoding: {} rounds in {:?}", iterations, duration);
    assert!(duration.as_millis() < 5000);
}
