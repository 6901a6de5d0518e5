//! Scripted run through the built-in yard.
//!
//! Run with: RUST_LOG=debug cargo run --example shunting_demo

use shunt_sim::{LevelDesc, Session, SimConfig, ThrottleCommand, TickOutcome};

fn main() {
    env_logger::init();
    println!("=== Shunting Yard - Simulation Demo ===\n");

    let mut session = match Session::from_level(&LevelDesc::demo(), SimConfig::default()) {
        Ok(session) => session,
        Err(err) => {
            eprintln!("failed to load demo level: {err}");
            return;
        }
    };

    println!("Initial state:");
    print_snapshot(&mut session);

    // Pull forward until wagon 1 is picked up.
    println!("\n--- Driving forward ---\n");
    session.throttle(ThrottleCommand::Increase);
    for _ in 0..40 {
        session.step(100.0);
        if !session.snapshot().train.is_empty() {
            break;
        }
    }
    print_snapshot(&mut session);

    // Stop and drop the wagon again.
    println!("\n--- Stopping and uncoupling wagon 1 ---\n");
    session.throttle(ThrottleCommand::Neutral);
    session.step(100.0);
    if let Some((_, pose)) = session.vehicle_position(1) {
        println!("  click -> {:?}", session.click(pose.x, pose.y));
    }
    print_snapshot(&mut session);

    // Throw the upper right turnout twice.
    println!("\n--- Throwing turnout (3, 2) ---\n");
    for _ in 0..2 {
        println!("  click -> {:?}", session.click(3.5 * 64.0, 2.5 * 64.0));
        println!("  turnout layer: {:?}", session.track_snapshot().turnout);
    }

    // Back up past the end of the line: the tick is rolled back.
    println!("\n--- Reversing into the buffer stop ---\n");
    session.throttle(ThrottleCommand::Decrease);
    for _ in 0..60 {
        match session.step(100.0) {
            TickOutcome::Committed => continue,
            outcome => {
                println!("  tick {} -> {:?}", session.current_tick(), outcome);
                break;
            }
        }
    }
    print_snapshot(&mut session);

    println!("\n=== Final State (JSON) ===\n");
    match session.snapshot().to_json_pretty() {
        Ok(json) => println!("{json}"),
        Err(err) => eprintln!("snapshot serialization failed: {err}"),
    }
}

fn print_snapshot(session: &mut Session) {
    let snapshot = session.snapshot();
    println!(
        "  tick {} state={:?} moves={} elapsed={:.0}ms",
        snapshot.tick, snapshot.state, snapshot.moves, snapshot.elapsed_ms
    );
    for v in &snapshot.vehicles {
        println!(
            "    {} {}: tile=({}, {}) rel={:.2} pos=({:.1}, {:.1}) speed={:.0} coupled={}",
            v.kind, v.id, v.tile_x, v.tile_y, v.rel, v.x, v.y, v.speed, v.coupled
        );
    }
    println!("    train: {:?}", snapshot.train);
}
