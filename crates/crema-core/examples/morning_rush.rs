//! Morning rush example: one hand-made shot, printed step by step.
//!
//! Grinds beans with the crank, hand-doses the portafilter, moves it to the
//! espresso machine and pulls the shot. A listener prints every notice and
//! completion the station publishes.
//!
//! Run with: `cargo run -p crema-core --example morning_rush`

use crema_core::config::StationConfig;
use crema_core::event::{EventKind, MachineEvent};
use crema_core::fixed::Fixed64;
use crema_core::machine::Item;
use crema_core::station::{CoffeeStation, Location, StationAction};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut station = CoffeeStation::new(StationConfig::default())?;

    for kind in [
        EventKind::Notice,
        EventKind::QualityEvaluated,
        EventKind::BrewingCompleted,
    ] {
        station.subscribe(
            kind,
            Box::new(|event: &MachineEvent| println!("  event: {event:?}")),
        );
    }

    // --- Step 1: Grind ---

    println!("grinding");
    station.apply(StationAction::AddBeans(5))?;
    station.apply(StationAction::SpinCompleted(2))?;
    println!("  ground: {:?}", station.grinder().ground_coffee());
    station.apply(StationAction::ItemRemoved {
        item: Item::GroundCoffee,
        at: Location::GrinderOutput,
    })?;

    // --- Step 2: Dose by hand ---

    println!("dosing");
    station.apply(StationAction::AddCoffee(Fixed64::from_num(40)))?;
    station.apply(StationAction::ItemPlaced {
        item: Item::Portafilter,
        at: Location::Doser,
    })?;
    // 10 g/s for 1.75 s.
    for _ in 0..7 {
        station.apply(StationAction::HoldTick(Fixed64::from_num(0.25)))?;
    }
    station.apply(StationAction::HoldReleased)?;
    println!("  portafilter: {} g", station.doser().portafilter_amount());

    // --- Step 3: Brew ---

    println!("brewing");
    station.move_portafilter_to_slot(0)?;
    station.apply(StationAction::ItemPlaced {
        item: Item::Cup,
        at: Location::Slot(0),
    })?;
    station.apply(StationAction::BrewButton(Some(0)))?;

    let step = Fixed64::from_num(0.5);
    while station.brewer().slot(0).is_some_and(|s| s.is_active) {
        for shot in station.tick(step) {
            println!(
                "  slot {} poured {} ml (quality {})",
                shot.slot, shot.volume, shot.quality
            );
        }
    }
    println!("done after {} s", station.elapsed());
    Ok(())
}
