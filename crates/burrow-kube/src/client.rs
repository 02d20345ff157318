//! kube-backed orchestration client.
//!
//! Pod and volume construction mirrors the production policy: isolated
//! runtime class, tenant priority above the warm pool's, a fast local
//! scratch mount plus a durable CSI-backed mount, and a termination grace
//! budget sized for an orderly state flush.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    CSIPersistentVolumeSource, Container, EmptyDirVolumeSource, EnvVar, PersistentVolume,
    PersistentVolumeClaim, PersistentVolumeClaimSpec, PersistentVolumeClaimVolumeSource,
    PersistentVolumeSpec, Pod, PodSpec, PodTemplateSpec, ResourceRequirements, Toleration, Volume,
    VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::{Api, DeleteParams, ListParams, ObjectMeta, PostParams};
use kube::Client;
use tracing::{debug, info};

use burrow_core::{names, Error, Result};

use crate::{Orchestrator, WarmPod, WARM_LABEL_CONSUMING, WARM_LABEL_READY, WARM_POOL_NAME};

const PRIORITY_TENANT: &str = "tenant-normal";
const PRIORITY_WARM: &str = "tenant-low";
const SERVICE_ACCOUNT: &str = "burrow-agent";
const ISOLATION_NODE_LABEL: &str = "burrow.io/isolated-runtime";
const STORAGE_CLASS: &str = "tenant-state";
const CSI_DRIVER: &str = "s3.csi.aws.com";
const READY_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Static policy configuration for the client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Agent container image reference.
    pub agent_image: String,
    /// Runtime class used for tenant isolation.
    pub runtime_class: String,
    /// Durable-storage bucket backing tenant volumes.
    pub storage_bucket: String,
    /// Graceful-termination budget for tenant pods, in seconds.
    pub pod_grace_seconds: i64,
}

/// Orchestration client over the Kubernetes API.
#[derive(Clone)]
pub struct KubeOrchestrator {
    client: Client,
    cfg: ClientConfig,
}

impl KubeOrchestrator {
    pub fn new(client: Client, cfg: ClientConfig) -> Self {
        Self { client, cfg }
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn pvcs(&self, namespace: &str) -> Api<PersistentVolumeClaim> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn pvs(&self) -> Api<PersistentVolume> {
        Api::all(self.client.clone())
    }

    /// Pod template shared by tenant and warm pods; the differences are the
    /// priority class, labels, env, and mounts.
    fn agent_container(&self, env: Vec<EnvVar>, mounts: Option<Vec<VolumeMount>>) -> Container {
        Container {
            name: "agent".into(),
            image: Some(self.cfg.agent_image.clone()),
            env: Some(env),
            resources: Some(ResourceRequirements {
                requests: Some(quantities(&[("cpu", "100m"), ("memory", "384Mi")])),
                limits: Some(quantities(&[("cpu", "500m"), ("memory", "512Mi")])),
                ..Default::default()
            }),
            volume_mounts: mounts,
            ..Default::default()
        }
    }

    fn isolation_scheduling(&self) -> (Option<String>, BTreeMap<String, String>, Vec<Toleration>) {
        let selector = labels(&[(ISOLATION_NODE_LABEL, "true")]);
        let toleration = Toleration {
            key: Some(ISOLATION_NODE_LABEL.into()),
            operator: Some("Equal".into()),
            value: Some("true".into()),
            effect: Some("NoSchedule".into()),
            ..Default::default()
        };
        (Some(self.cfg.runtime_class.clone()), selector, vec![toleration])
    }
}

#[async_trait]
impl Orchestrator for KubeOrchestrator {
    async fn create_volume(&self, tenant_id: &str, namespace: &str) -> Result<()> {
        let pv_name = names::pv_name(tenant_id);
        let pvc_name = names::pvc_name(tenant_id);

        let pv = PersistentVolume {
            metadata: ObjectMeta {
                name: Some(pv_name.clone()),
                ..Default::default()
            },
            spec: Some(PersistentVolumeSpec {
                capacity: Some(quantities(&[("storage", "1Gi")])),
                access_modes: Some(vec!["ReadWriteMany".into()]),
                storage_class_name: Some(STORAGE_CLASS.into()),
                persistent_volume_reclaim_policy: Some("Retain".into()),
                csi: Some(CSIPersistentVolumeSource {
                    driver: CSI_DRIVER.into(),
                    volume_handle: format!("tenant-{tenant_id}"),
                    volume_attributes: Some(labels(&[
                        ("bucketName", &self.cfg.storage_bucket),
                        ("subPath", &format!("tenants/{tenant_id}")),
                    ])),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        tolerate_exists(self.pvs().create(&PostParams::default(), &pv).await)?;

        let pvc = PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(pvc_name),
                namespace: Some(namespace.into()),
                ..Default::default()
            },
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: Some(vec!["ReadWriteMany".into()]),
                storage_class_name: Some(STORAGE_CLASS.into()),
                volume_name: Some(pv_name),
                resources: Some(VolumeResourceRequirements {
                    requests: Some(quantities(&[("storage", "1Gi")])),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        tolerate_exists(self.pvcs(namespace).create(&PostParams::default(), &pvc).await)?;
        Ok(())
    }

    async fn create_tenant_pod(
        &self,
        tenant_id: &str,
        namespace: &str,
        volume_ref: &str,
        secret_token: &str,
        node_hint: Option<&str>,
    ) -> Result<String> {
        let pod_name = names::pod_name(tenant_id);
        let (runtime_class, node_selector, tolerations) = self.isolation_scheduling();

        let env = vec![
            EnvVar {
                name: "TENANT_ID".into(),
                value: Some(tenant_id.into()),
                ..Default::default()
            },
            EnvVar {
                name: "AGENT_SECRET_TOKEN".into(),
                value: Some(secret_token.into()),
                ..Default::default()
            },
        ];
        let mounts = vec![
            VolumeMount {
                name: "scratch".into(),
                mount_path: "/agent-data".into(),
                ..Default::default()
            },
            VolumeMount {
                name: "state".into(),
                mount_path: "/state".into(),
                ..Default::default()
            },
        ];

        let pod = Pod {
            metadata: ObjectMeta {
                name: Some(pod_name.clone()),
                namespace: Some(namespace.into()),
                labels: Some(labels(&[("app", "burrow-agent"), ("tenant", tenant_id)])),
                ..Default::default()
            },
            spec: Some(PodSpec {
                runtime_class_name: runtime_class,
                priority_class_name: Some(PRIORITY_TENANT.into()),
                service_account_name: Some(SERVICE_ACCOUNT.into()),
                node_name: node_hint.map(String::from),
                node_selector: Some(node_selector),
                tolerations: Some(tolerations),
                containers: vec![self.agent_container(env, Some(mounts))],
                volumes: Some(vec![
                    Volume {
                        name: "scratch".into(),
                        empty_dir: Some(EmptyDirVolumeSource::default()),
                        ..Default::default()
                    },
                    Volume {
                        name: "state".into(),
                        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                            claim_name: volume_ref.into(),
                            ..Default::default()
                        }),
                        ..Default::default()
                    },
                ]),
                termination_grace_period_seconds: Some(self.cfg.pod_grace_seconds),
                ..Default::default()
            }),
            ..Default::default()
        };

        match self.pods(namespace).create(&PostParams::default(), &pod).await {
            Ok(_) => {
                info!(tenant = %tenant_id, pod = %pod_name, node_hint = ?node_hint, "tenant pod created");
                Ok(pod_name)
            }
            // A pod with the derived name already exists; attach to it.
            Err(err) if api_code(&err) == Some(409) => {
                debug!(tenant = %tenant_id, pod = %pod_name, "tenant pod already exists, attaching");
                Ok(pod_name)
            }
            Err(err) => Err(platform_err(err)),
        }
    }

    async fn wait_pod_ready(
        &self,
        tenant_id: &str,
        namespace: &str,
        timeout: Duration,
    ) -> Result<String> {
        let pod_name = names::pod_name(tenant_id);
        let pods = self.pods(namespace);
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if let Ok(Some(pod)) = pods.get_opt(&pod_name).await {
                if let Some(status) = pod.status {
                    let running = status.phase.as_deref() == Some("Running");
                    if let Some(ip) = status.pod_ip.filter(|ip| running && !ip.is_empty()) {
                        return Ok(ip);
                    }
                }
            }
            if tokio::time::Instant::now() + READY_POLL_INTERVAL > deadline {
                return Err(Error::Timeout(format!(
                    "pod {pod_name} not ready after {}s",
                    timeout.as_secs()
                )));
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    async fn delete_pod(&self, name: &str, namespace: &str, grace_seconds: i64) -> Result<()> {
        let params = DeleteParams {
            grace_period_seconds: Some(grace_seconds.max(0) as u32),
            ..Default::default()
        };
        match self.pods(namespace).delete(name, &params).await {
            Ok(_) => Ok(()),
            Err(err) if api_code(&err) == Some(404) => Ok(()),
            Err(err) => Err(platform_err(err)),
        }
    }

    async fn delete_volume(&self, tenant_id: &str, namespace: &str) -> Result<()> {
        let params = DeleteParams::default();
        match self.pvcs(namespace).delete(&names::pvc_name(tenant_id), &params).await {
            Ok(_) => {}
            Err(err) if api_code(&err) == Some(404) => {}
            Err(err) => return Err(platform_err(err)),
        }
        match self.pvs().delete(&names::pv_name(tenant_id), &params).await {
            Ok(_) => Ok(()),
            Err(err) if api_code(&err) == Some(404) => Ok(()),
            Err(err) => Err(platform_err(err)),
        }
    }

    async fn pod_exists(&self, name: &str, namespace: &str) -> Result<bool> {
        match self.pods(namespace).get_opt(name).await {
            Ok(pod) => Ok(pod.is_some()),
            Err(err) => Err(platform_err(err)),
        }
    }

    async fn ensure_warm_pool(&self, namespace: &str, replicas: i32) -> Result<()> {
        let warm_labels = labels(&[("app", WARM_POOL_NAME), ("warm", WARM_LABEL_READY)]);
        let (runtime_class, node_selector, tolerations) = self.isolation_scheduling();

        let pod_spec = PodSpec {
            runtime_class_name: runtime_class,
            priority_class_name: Some(PRIORITY_WARM.into()),
            service_account_name: Some(SERVICE_ACCOUNT.into()),
            node_selector: Some(node_selector),
            tolerations: Some(tolerations),
            containers: vec![self.agent_container(
                vec![EnvVar {
                    name: "AGENT_SECRET_TOKEN".into(),
                    value: Some(String::new()),
                    ..Default::default()
                }],
                None,
            )],
            termination_grace_period_seconds: Some(10),
            ..Default::default()
        };

        let deployments = self.deployments(namespace);
        match deployments.get_opt(WARM_POOL_NAME).await.map_err(platform_err)? {
            None => {
                let deploy = Deployment {
                    metadata: ObjectMeta {
                        name: Some(WARM_POOL_NAME.into()),
                        namespace: Some(namespace.into()),
                        labels: Some(warm_labels.clone()),
                        ..Default::default()
                    },
                    spec: Some(DeploymentSpec {
                        replicas: Some(replicas),
                        selector: LabelSelector {
                            match_labels: Some(warm_labels.clone()),
                            ..Default::default()
                        },
                        template: PodTemplateSpec {
                            metadata: Some(ObjectMeta {
                                labels: Some(warm_labels),
                                ..Default::default()
                            }),
                            spec: Some(pod_spec),
                        },
                        ..Default::default()
                    }),
                    ..Default::default()
                };
                tolerate_exists(deployments.create(&PostParams::default(), &deploy).await)?;
                info!(%namespace, replicas, "warm-pool workload created");
                Ok(())
            }
            Some(mut existing) => {
                let spec = existing.spec.get_or_insert_with(Default::default);
                spec.replicas = Some(replicas);
                if let Some(pod) = spec.template.spec.as_mut() {
                    if let Some(container) = pod.containers.first_mut() {
                        container.image = Some(self.cfg.agent_image.clone());
                    }
                }
                deployments
                    .replace(WARM_POOL_NAME, &PostParams::default(), &existing)
                    .await
                    .map_err(platform_err)?;
                Ok(())
            }
        }
    }

    async fn claim_warm_pod(&self, namespace: &str) -> Result<Option<WarmPod>> {
        let pods = self.pods(namespace);
        let selector = format!("app={WARM_POOL_NAME},warm={WARM_LABEL_READY}");
        let list = pods
            .list(&ListParams::default().labels(&selector))
            .await
            .map_err(platform_err)?;

        for pod in list {
            let Some(name) = pod.metadata.name.clone() else { continue };
            let status = pod.status.as_ref();
            let running = status.and_then(|s| s.phase.as_deref()) == Some("Running");
            let address = status.and_then(|s| s.pod_ip.clone()).unwrap_or_default();
            let terminating = pod.metadata.deletion_timestamp.is_some();
            if !running || address.is_empty() || terminating {
                continue;
            }

            // Flip warm=true → warm=consuming. The workload selector needs
            // warm=true, so a successful flip orphans the pod from its
            // controller and triggers a replacement. The replace carries the
            // listed resourceVersion: if another replica claimed this pod
            // first, the write fails with a conflict and we move on.
            let mut claimed = pod.clone();
            claimed
                .metadata
                .labels
                .get_or_insert_with(Default::default)
                .insert("warm".into(), WARM_LABEL_CONSUMING.into());
            match pods.replace(&name, &PostParams::default(), &claimed).await {
                Ok(updated) => {
                    let node_name = updated
                        .spec
                        .as_ref()
                        .and_then(|s| s.node_name.clone())
                        .unwrap_or_default();
                    info!(pod = %name, node = %node_name, "warm pod claimed");
                    return Ok(Some(WarmPod {
                        name,
                        node_name,
                        address,
                    }));
                }
                Err(err) if api_code(&err) == Some(409) => {
                    debug!(pod = %name, "warm pod claimed by another replica, trying next");
                    continue;
                }
                Err(err) => return Err(platform_err(err)),
            }
        }
        Ok(None)
    }
}

fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| ((*k).into(), (*v).into())).collect()
}

fn quantities(pairs: &[(&str, &str)]) -> BTreeMap<String, Quantity> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).into(), Quantity((*v).into())))
        .collect()
}

fn api_code(err: &kube::Error) -> Option<u16> {
    match err {
        kube::Error::Api(resp) => Some(resp.code),
        _ => None,
    }
}

fn platform_err(err: kube::Error) -> Error {
    match api_code(&err) {
        Some(404) => Error::NotFound(err.to_string()),
        Some(409) => Error::AlreadyExists(err.to_string()),
        _ => Error::Unavailable(format!("container platform: {err}")),
    }
}

fn tolerate_exists<T>(result: kube::Result<T>) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(err) if api_code(&err) == Some(409) => Ok(()),
        Err(err) => Err(platform_err(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_and_quantity_helpers() {
        let l = labels(&[("app", "burrow-agent"), ("tenant", "alice")]);
        assert_eq!(l.get("tenant").map(String::as_str), Some("alice"));

        let q = quantities(&[("cpu", "100m")]);
        assert_eq!(q.get("cpu"), Some(&Quantity("100m".into())));
    }

    #[test]
    fn warm_selector_values() {
        assert_eq!(WARM_LABEL_READY, "true");
        assert_eq!(WARM_LABEL_CONSUMING, "consuming");
        assert_eq!(
            format!("app={WARM_POOL_NAME},warm={WARM_LABEL_READY}"),
            "app=warm-pool,warm=true"
        );
    }
}
