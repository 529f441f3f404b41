use lastcall::{Channel, Received};

use crate::Config;

pub async fn run(cfg: &Config) -> Result<(), String> {
    let ch = Channel::<i32>::new("demo.cancel", cfg.capacity);
    ch.send(1).await.map_err(|e| e.to_string())?;

    ch.close_with_value(10).map_err(|e| e.to_string())?;
    ch.close_with_value(10).map_err(|e| e.to_string())?;
    let cancel = ch.close_with_value(15).map_err(|e| e.to_string())?;

    for _ in 0..3 {
        let (value, ok) = ch.recv().await.into_pair();
        println!("recv -> ({value}, {ok})");
    }

    cancel.cancel();
    let after = ch.recv().await;
    println!("after cancel -> {after:?}");
    if after != Received::Closed {
        return Err(format!("expected a bare close after cancel, got {after:?}"));
    }

    match ch.close_with_value(20) {
        Ok(_) => Err("re-closing a cancelled channel should be refused".into()),
        Err(e) => {
            println!("re-close refused: {e}");
            Ok(())
        }
    }
}
