pub mod cancel_restores;
pub mod drain_then_override;
pub mod reflect_recv;
pub mod select_override;
