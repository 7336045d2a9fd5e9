//! In-process publish/subscribe registry

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use crate::errors::DeployError;

/// A subscriber to named events carrying a payload of type `P`
#[async_trait]
pub trait Listener<P: Send>: Send + Sync {
    /// Handle a published event
    async fn on_event(&self, event: &str, payload: &mut P) -> Result<(), DeployError>;
}

/// Ordered listener registry keyed by exact event names.
///
/// Delivery happens on the publishing task: listeners are awaited one after
/// another in registration order and the first failure is handed back to the
/// publisher.
pub struct EventBus<P: Send> {
    listeners: HashMap<String, Vec<Arc<dyn Listener<P>>>>,
}

impl<P: Send> EventBus<P> {
    /// Create an empty bus
    pub fn new() -> Self {
        Self {
            listeners: HashMap::new(),
        }
    }

    /// Append a listener to an event. The same listener may be added twice.
    pub fn subscribe(
        &mut self,
        event: &str,
        listener: Arc<dyn Listener<P>>,
    ) -> Result<(), DeployError> {
        ensure_name(event)?;
        self.listeners
            .entry(event.to_string())
            .or_default()
            .push(listener);
        Ok(())
    }

    /// Remove the first registration of `listener` for `event`
    pub fn unsubscribe(
        &mut self,
        event: &str,
        listener: &Arc<dyn Listener<P>>,
    ) -> Result<(), DeployError> {
        ensure_name(event)?;
        let Some(registered) = self.listeners.get_mut(event) else {
            return Ok(());
        };
        if let Some(index) = registered.iter().position(|l| same_listener(l, listener)) {
            registered.remove(index);
        }
        Ok(())
    }

    /// Remove all listeners of one event, or of every event when `event` is `None`
    pub fn unsubscribe_all(&mut self, event: Option<&str>) {
        match event {
            Some(name) if !name.is_empty() => {
                self.listeners.remove(name);
            }
            _ => self.listeners.clear(),
        }
    }

    /// Number of listeners registered for `event`
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.get(event).map(Vec::len).unwrap_or(0)
    }

    /// Deliver `event` to its listeners in registration order
    pub async fn publish(&self, event: &str, payload: &mut P) -> Result<(), DeployError> {
        ensure_name(event)?;
        let Some(registered) = self.listeners.get(event) else {
            return Ok(());
        };

        trace!("Publishing {} to {} listener(s)", event, registered.len());
        for listener in registered {
            listener.on_event(event, payload).await?;
        }
        Ok(())
    }
}

impl<P: Send> Default for EventBus<P> {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure_name(event: &str) -> Result<(), DeployError> {
    if event.is_empty() {
        return Err(DeployError::InvalidArgument(
            "Event name can not be empty".to_string(),
        ));
    }
    Ok(())
}

// Compares data pointers only; vtable pointers of the same type may differ
// between codegen units.
fn same_listener<P: Send>(a: &Arc<dyn Listener<P>>, b: &Arc<dyn Listener<P>>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
