//! Close controller: validate, close, and install an override.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use lastcall_types::{ChannelId, CloseError};

use crate::channel::ChannelCore;
use crate::reflect::Reflect;
use crate::store::{Install, OverrideEntry, OverrideStore};

/// Removes an installed override.
///
/// Only the first call to [`Cancel::cancel`] has an effect. Dropping the
/// handle without calling it leaves the override in place.
pub struct Cancel {
    store: Arc<OverrideStore>,
    id: ChannelId,
    done: AtomicBool,
}

impl Cancel {
    pub fn cancel(&self) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.store.delete(self.id) {
            tracing::debug!(channel = %self.id, "override cancelled");
        }
    }

    pub fn channel_id(&self) -> ChannelId {
        self.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Cancel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cancel")
            .field("channel", &self.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Closes `channel` so that, once drained, every receive yields `value`.
///
/// `channel` may be any value; it is validated at run time:
///
/// - it must be a channel handle that can send, otherwise
///   [`CloseError::NotWritableChannel`];
/// - `value` must have the channel's element type, otherwise
///   [`CloseError::ChannelTypeMismatch`].
///
/// On failure nothing changes. The typed [`Sender::close_with_value`](crate::Sender::close_with_value)
/// skips these checks because the compiler already made them.
pub fn close_with_value(channel: &dyn Reflect, value: &dyn Reflect) -> Result<Cancel, CloseError> {
    let Some(handle) = channel.as_channel() else {
        return Err(CloseError::NotWritableChannel {
            kind: channel.kind(),
            direction: None,
        });
    };
    let direction = handle.direction();
    if !direction.can_send() {
        return Err(CloseError::NotWritableChannel {
            kind: channel.kind(),
            direction: Some(direction),
        });
    }
    let element = handle.element();
    if !element.accepts(value) {
        return Err(CloseError::ChannelTypeMismatch {
            value: value.kind(),
            channel: element.kind(),
            value_type: value.type_name(),
            channel_type: element.type_name(),
        });
    }
    handle.install(Arc::from(value.clone_boxed()))
}

pub(crate) fn install<T>(
    core: &ChannelCore,
    native: &async_channel::Sender<T>,
    value: Arc<dyn Reflect>,
) -> Result<Cancel, CloseError> {
    let entry = OverrideEntry::new(value).labeled(Arc::clone(&core.name));
    match core.store.install(core.id, entry, || native.close()) {
        Install::Closed => {
            tracing::debug!(channel = %core.id, name = %core.name, "closed with override value");
        }
        Install::Replaced => {
            tracing::debug!(channel = %core.id, name = %core.name, "override value replaced");
        }
        Install::Rejected => {
            tracing::debug!(channel = %core.id, name = %core.name, "close with value refused: already closed");
            return Err(CloseError::AlreadyClosed { channel: core.id });
        }
    }
    Ok(Cancel {
        store: Arc::clone(&core.store),
        id: core.id,
        done: AtomicBool::new(false),
    })
}
