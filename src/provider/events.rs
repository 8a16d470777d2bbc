use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 256;

/// "My data changed" notification published by a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEvent {
   pub provider: String,
   pub value:    String,
}

/// Process-wide fan-out of provider change events
#[derive(Debug, Clone)]
pub struct EventBus {
   tx: broadcast::Sender<ProviderEvent>,
}

impl Default for EventBus {
   fn default() -> Self {
      Self::new()
   }
}

impl EventBus {
   pub fn new() -> Self {
      let (tx, _) = broadcast::channel(EVENT_CAPACITY);
      Self { tx }
   }

   /// Publishes an event; returns how many subscribers will see it.
   pub fn publish(&self, provider: impl Into<String>, value: impl Into<String>) -> usize {
      let event = ProviderEvent { provider: provider.into(), value: value.into() };
      tracing::debug!(provider = %event.provider, value = %event.value, "provider event");
      self.tx.send(event).unwrap_or(0)
   }

   pub fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
      self.tx.subscribe()
   }
}
