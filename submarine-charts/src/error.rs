use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("template engine failed to install release {release:?} in {namespace:?}: {source}")]
    Install {
        release: String,
        namespace: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("template engine failed to uninstall release {release:?} in {namespace:?}: {source}")]
    Uninstall {
        release: String,
        namespace: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("failed to probe install state of release {release:?} in {namespace:?}: {source}")]
    Probe {
        release: String,
        namespace: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}
