//! The event recorder of §4.F: structured events addressed to the parent.
//! Grounded in `kube::runtime::events::Recorder`, but behind a trait so
//! tests can assert on emitted events without a live cluster - the same
//! "trait + production adapter + recording double" shape as
//! [`submarine_store::Store`] and [`submarine_charts::ChartEngine`].

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Resource, ResourceExt};
use parking_lot::Mutex;
use tracing::warn;

use submarine_types::{ObjectKey, Submarine};

/// Builds the `ObjectReference` an event is "regarding" from a live parent.
fn object_reference(parent: &Submarine) -> ObjectReference {
    ObjectReference {
        api_version: Some(Submarine::api_version(&()).to_string()),
        kind: Some(Submarine::kind(&()).to_string()),
        name: Some(parent.name_any()),
        namespace: parent.namespace(),
        uid: parent.uid(),
        resource_version: parent.resource_version(),
        ..Default::default()
    }
}

pub const REASON_SYNCED: &str = "Synced";
pub const REASON_RESOURCE_EXISTS: &str = "ErrResourceExists";

/// One event as described by §4.F / §7, independent of how it's delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmarineEvent {
    pub event_type: EventTypeTag,
    pub reason: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTypeTag {
    Normal,
    Warning,
}

impl SubmarineEvent {
    pub fn synced() -> Self {
        Self {
            event_type: EventTypeTag::Normal,
            reason: REASON_SYNCED.to_string(),
            message: "reconcile succeeded".to_string(),
        }
    }

    /// S3's exact wording: `Resource "submarine-server" already exists and is not managed by Submarine`.
    pub fn resource_exists(name: &str) -> Self {
        Self {
            event_type: EventTypeTag::Warning,
            reason: REASON_RESOURCE_EXISTS.to_string(),
            message: format!("Resource {name:?} already exists and is not managed by Submarine"),
        }
    }
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, parent: &Submarine, event: SubmarineEvent);
}

/// Publishes events through the real cluster's events API.
pub struct KubeEventSink {
    client: kube::Client,
    reporter: Reporter,
}

impl KubeEventSink {
    pub fn new(client: kube::Client, controller_name: impl Into<String>) -> Self {
        Self {
            client,
            reporter: Reporter {
                controller: controller_name.into(),
                instance: None,
            },
        }
    }
}

#[async_trait]
impl EventSink for KubeEventSink {
    async fn publish(&self, parent: &Submarine, event: SubmarineEvent) {
        let reference = object_reference(parent);
        let recorder = Recorder::new(self.client.clone(), self.reporter.clone(), reference);
        let result = recorder
            .publish(&Event {
                type_: match event.event_type {
                    EventTypeTag::Normal => EventType::Normal,
                    EventTypeTag::Warning => EventType::Warning,
                },
                reason: event.reason.clone(),
                note: Some(event.message.clone()),
                action: "Reconcile".to_string(),
                secondary: None,
            })
            .await;
        if let Err(err) = result {
            warn!(parent = %parent.name_any(), error = %err, "failed to publish event");
        }
    }
}

/// Records published events in-memory for assertions in tests (S3, S6).
#[derive(Default)]
pub struct RecordingEventSink {
    published: Mutex<Vec<(ObjectKey, SubmarineEvent)>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<(ObjectKey, SubmarineEvent)> {
        self.published.lock().clone()
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn publish(&self, parent: &Submarine, event: SubmarineEvent) {
        let key = ObjectKey::new(parent.namespace().unwrap_or_default(), parent.name_any());
        self.published.lock().push((key, event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::ObjectMeta;
    use submarine_types::SubmarineSpec;

    fn test_parent() -> Submarine {
        let mut parent = Submarine::new(
            "ex",
            SubmarineSpec {
                version: "0.6".to_string(),
                server: submarine_types::ServerSpec {
                    image: None,
                    replicas: 1,
                },
                database: submarine_types::DatabaseSpec {
                    image: None,
                    replicas: None,
                    storage_size: "10Gi".to_string(),
                },
                tensorboard: submarine_types::TensorboardSpec {
                    storage_size: "1Gi".to_string(),
                },
                storage: submarine_types::StorageSpec {
                    storage_type: "host".to_string(),
                    nfs_ip: None,
                    nfs_path: None,
                    host_path: Some("/tmp/sub".to_string()),
                },
            },
        );
        parent.metadata = ObjectMeta {
            namespace: Some("default".to_string()),
            name: Some("ex".to_string()),
            ..Default::default()
        };
        parent
    }

    #[tokio::test]
    async fn recording_sink_captures_published_events() {
        let sink = RecordingEventSink::new();
        let parent = test_parent();
        sink.publish(&parent, SubmarineEvent::resource_exists("submarine-server"))
            .await;
        let published = sink.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, ObjectKey::new("default", "ex"));
        assert_eq!(published[0].1.reason, REASON_RESOURCE_EXISTS);
        assert_eq!(
            published[0].1.message,
            "Resource \"submarine-server\" already exists and is not managed by Submarine"
        );
    }
}
