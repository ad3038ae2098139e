//! Shared fakes for the reconciler behaviour tests.

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cfgward_core::{
    common_labels, ClusterConfig, ClusterSpec, NetworkSpec, Resource, WorkerProfile,
};
use cfgward_reconciler::{
    ClientFactory, Error, LeaseFlag, Reconciler, Result, Snapshot, Stack, StackClient,
};
use parking_lot::Mutex;
use serde_json::json;
use tracing_subscriber::EnvFilter;

pub const NAMESPACE: &str = "kube-system";
const RBAC_API: &str = "rbac.authorization.k8s.io/v1";
const BOOTSTRAP_RBAC_NAME: &str = "system:bootstrappers:worker-config";

/// In-memory stand-in for the managed system.
#[derive(Default)]
pub struct FakeCluster {
    /// Every apply attempt, failed ones included, in order.
    attempts: Mutex<Vec<Vec<Resource>>>,
    /// Begin/end markers of each attempt, tagged with the cluster domain.
    events: Mutex<Vec<String>>,
    fail: AtomicBool,
    hang: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl FakeCluster {
    pub fn attempts(&self) -> Vec<Vec<Resource>> {
        self.attempts.lock().clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().len()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_hanging(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }
}

fn domain_of(stack: &Stack) -> String {
    stack
        .resources
        .iter()
        .find(|r| r.name == "worker-config-default")
        .and_then(|r| r.body.get("clusterDomain"))
        .and_then(|d| d.as_str())
        .unwrap_or("?")
        .to_string()
}

#[async_trait]
impl StackClient for FakeCluster {
    async fn apply_stack(&self, stack: &Stack) -> Result<()> {
        let domain = domain_of(stack);
        self.attempts.lock().push(stack.resources.clone());
        self.events.lock().push(format!("begin:{domain}"));

        if self.hang.load(Ordering::SeqCst) {
            future::pending::<()>().await;
        }
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.events.lock().push(format!("end:{domain}"));
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::apply("the server is currently unable to handle the request"));
        }
        Ok(())
    }
}

pub struct FakeClientFactory(pub Arc<FakeCluster>);

impl ClientFactory for FakeClientFactory {
    fn stack_client(&self) -> Result<Arc<dyn StackClient>> {
        Ok(self.0.clone())
    }
}

/// Worker configuration generator, deliberately emitting resources unsorted.
pub fn generate_worker_config(snapshot: &Snapshot) -> Result<Vec<Resource>> {
    let config = snapshot
        .config_snapshot
        .as_ref()
        .ok_or_else(|| Error::generation("no configuration"))?;
    let labels = common_labels("worker-config");

    let mut resources = vec![
        Resource::namespaced(RBAC_API, "RoleBinding", NAMESPACE, BOOTSTRAP_RBAC_NAME)
            .with_labels(labels.clone()),
        Resource::namespaced(RBAC_API, "Role", NAMESPACE, BOOTSTRAP_RBAC_NAME)
            .with_labels(labels.clone()),
        Resource::namespaced("v1", "ConfigMap", NAMESPACE, "worker-config-default")
            .with_labels(labels.clone())
            .with_body(json!({
                "clusterDomain": config.cluster_domain,
                "clusterDNS": [config.dns_address.to_string()],
            })),
    ];

    for profile in &snapshot.profiles {
        if !profile.config.is_object() {
            return Err(Error::generation(format!(
                "failed to decode worker profile {:?}",
                profile.name
            )));
        }
        let name = format!("worker-config-{}", profile.name);
        resources.push(
            Resource::namespaced("v1", "ConfigMap", NAMESPACE, name)
                .with_labels(labels.clone())
                .with_body(profile.config.clone()),
        );
    }

    Ok(resources)
}

pub fn cluster_config(domain: &str) -> ClusterConfig {
    ClusterConfig {
        name: "cluster".into(),
        spec: ClusterSpec {
            network: NetworkSpec {
                cluster_domain: domain.into(),
                dns_address: "10.96.0.10".into(),
            },
            worker_profiles: Vec::new(),
        },
    }
}

pub fn with_profile(
    mut config: ClusterConfig,
    name: &str,
    profile: serde_json::Value,
) -> ClusterConfig {
    config.spec.worker_profiles.push(WorkerProfile {
        name: name.into(),
        config: profile,
    });
    config
}

pub struct Harness {
    pub reconciler: Arc<Reconciler>,
    pub cluster: Arc<FakeCluster>,
    pub leader: Arc<LeaseFlag>,
}

/// Route logs to the test writer, filtered by `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A started reconciler backed by fakes. Must run inside a Tokio runtime.
pub fn started(leader: bool) -> Harness {
    init_tracing();
    let cluster = Arc::new(FakeCluster::default());
    let lease = Arc::new(LeaseFlag::new());
    if leader {
        lease.acquire();
    }

    let reconciler = Reconciler::builder()
        .with_generator(Arc::new(generate_worker_config))
        .with_leader_elector(lease.clone())
        .with_client_factory(Arc::new(FakeClientFactory(cluster.clone())))
        .build()
        .expect("valid reconciler");
    reconciler.init().expect("init");
    reconciler.start().expect("start");

    Harness {
        reconciler: Arc::new(reconciler),
        cluster,
        leader: lease,
    }
}

/// Poll `condition` every 10ms for up to 5s.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
