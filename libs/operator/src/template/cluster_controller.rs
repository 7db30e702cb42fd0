//! Cluster-scoped `AIMClusterServiceTemplate` controller entrypoint. Same
//! pipeline as [`super::controller`], over the cluster-scoped CRD kind.

use futures::StreamExt;
use kube::api::{Api, ListParams};
use kube::client::Client;
use kube::runtime::{controller::Controller, watcher::Config};
use tracing::{error, info, trace};

use crate::controller::State;
use crate::crd::AIMClusterServiceTemplate;

use super::reconcile::{error_policy, reconcile};

/// Starts the `AIMClusterServiceTemplate` controller loop. Runs until the
/// process receives a shutdown signal.
pub async fn run(state: State, client: Client) {
    let templates = Api::<AIMClusterServiceTemplate>::all(client.clone());
    if let Err(e) = templates.list(&ListParams::default().limit(1)).await {
        error!("AIMClusterServiceTemplate CRD is not queryable; {e:?}. Is the CRD installed?");
        info!("Installation: cargo run --bin crdgen | kubectl apply -f -");
        std::process::exit(1);
    }
    trace!("init AIMClusterServiceTemplate controller");
    Controller::new(templates, Config::default().any_semantic())
        .shutdown_on_signal()
        .run(reconcile, error_policy, state.to_context(client))
        .filter_map(|x| async move { std::result::Result::ok(x) })
        .for_each(|_| futures::future::ready(()))
        .await;
}
