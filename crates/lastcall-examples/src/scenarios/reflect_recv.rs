use std::collections::HashMap;

use lastcall::{Channel, Reflect, channel, close_with_value};

use crate::Config;

pub async fn run(cfg: &Config) -> Result<(), String> {
    let counts = Channel::<HashMap<String, u64>>::new("demo.counts", cfg.capacity);
    let (_tx, rx_only) = channel::<i32>("demo.recv_only", cfg.capacity);

    let attempts: [(&str, &dyn Reflect, &dyn Reflect); 3] = [
        ("plain integer", &7_i32, &7_i32),
        ("receive-only handle", &rx_only, &7_i32),
        ("wrong element type", &counts, &"not a map"),
    ];
    for (label, entity, value) in attempts {
        match close_with_value(entity, value) {
            Ok(_) => return Err(format!("{label}: close unexpectedly succeeded")),
            Err(e) => println!("{label}: {e}"),
        }
    }

    let last = HashMap::from([("requests".to_string(), 3_u64)]);
    let entity: &dyn Reflect = &counts;
    close_with_value(entity, &last).map_err(|e| e.to_string())?;

    let receiver = entity
        .as_receiver()
        .ok_or("a bidirectional channel can receive")?;
    println!(
        "receiving reflectively from {} ({})",
        receiver.id(),
        receiver.element().type_name()
    );
    let got = receiver
        .recv_dyn(true)
        .ok_or("a blocking receive always completes")?;
    println!("reflective receive -> delivered: {}", got.is_received());

    let got = got
        .downcast::<HashMap<String, u64>>()
        .map_err(|other| format!("unexpected element: {other:?}"))?;
    println!("typed view -> {got:?}");
    Ok(())
}
