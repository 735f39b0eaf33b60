use tokio::sync::oneshot;

use crate::error::PersistenceError;

/// One decoded telemetry tuple. Fields are carried as the peer sent them;
/// numeric interpretation is left to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    device_id: String,
    latitude: String,
    longitude: String,
    speed: String,
    heading: String,
}

impl Record {
    pub fn new(
        device_id: impl Into<String>,
        latitude: impl Into<String>,
        longitude: impl Into<String>,
        speed: impl Into<String>,
        heading: impl Into<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            latitude: latitude.into(),
            longitude: longitude.into(),
            speed: speed.into(),
            heading: heading.into(),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn latitude(&self) -> &str {
        &self.latitude
    }

    pub fn longitude(&self) -> &str {
        &self.longitude
    }

    pub fn speed(&self) -> &str {
        &self.speed
    }

    pub fn heading(&self) -> &str {
        &self.heading
    }
}

pub type StoreOutcome = Result<(), PersistenceError>;

/// Entry in the ingress queue: a record plus the single-use handle the
/// dispatch worker answers through. The connection keeps the socket.
#[derive(Debug)]
pub struct PendingRequest {
    pub record: Record,
    pub completion: oneshot::Sender<StoreOutcome>,
}

impl PendingRequest {
    /// Pair a record with a fresh completion handle. The receiver stays
    /// with the connection handler.
    pub fn new(record: Record) -> (Self, oneshot::Receiver<StoreOutcome>) {
        let (completion, rx) = oneshot::channel();
        (Self { record, completion }, rx)
    }

    /// Deliver the outcome. Returns false when the connection side is gone,
    /// in which case the outcome is dropped.
    pub fn complete(self, outcome: StoreOutcome) -> bool {
        self.completion.send(outcome).is_ok()
    }
}
