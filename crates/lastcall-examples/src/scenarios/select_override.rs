use std::time::Duration;

use lastcall::{Received, Select, channel};

use crate::Config;

pub async fn run(cfg: &Config) -> Result<(), String> {
    let (ticks_tx, ticks_rx) = channel::<u64>("demo.ticks", cfg.capacity);
    let (stop_tx, stop_rx) = channel::<&'static str>("demo.stop", 1);

    tokio::spawn(async move {
        for tick in 0..5_u64 {
            if ticks_tx.send(tick).await.is_err() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        ticks_tx.close();
    });

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        if let Err(e) = stop_tx.close_with_value("deadline reached") {
            tracing::warn!(error = %e, "could not close stop channel");
        }
    });

    {
        let mut sel = Select::new();
        let ticks = sel.recv(&ticks_rx);
        let stop = sel.recv(&stop_rx);

        loop {
            let op = sel.select().await;
            if op.index() == stop {
                return report_stop(op.recv(&stop_rx));
            }
            debug_assert_eq!(op.index(), ticks);
            match op.recv(&ticks_rx) {
                Received::Value(tick) => println!("tick {tick}"),
                Received::Override(tick) => println!("tick channel override {tick}"),
                Received::Closed => break,
            }
        }
    }

    // A drained, plainly closed channel is always ready, so stop selecting on it.
    println!("ticks finished; waiting for the stop channel");
    report_stop(stop_rx.recv().await)
}

fn report_stop(received: Received<&'static str>) -> Result<(), String> {
    match received {
        Received::Override(reason) => {
            println!("stopping: {reason}");
            Ok(())
        }
        other => Err(format!("unexpected stop message: {other:?}")),
    }
}
