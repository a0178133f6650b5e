//! Scans a live Kubernetes cluster for every container image referenced by
//! a workload, the input set later classified and migrated. Built on
//! `kube`+`k8s-openapi` (`Api::namespaced`/`Api::all` plus `ListParams`),
//! bridged into this crate's synchronous call graph through
//! `crate::runtime::block_on`.

use std::collections::BTreeSet;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::PodTemplateSpec;
use kube::api::ListParams;
use kube::{Api, Client};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::runtime::block_on;

#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("cannot connect to kubernetes cluster: {0}")]
    ConnectionFailed(String),

    #[error("cannot list {workload_kind} in namespace {namespace:?}: {raw_error_message}")]
    ListFailed {
        workload_kind: &'static str,
        namespace: Option<String>,
        raw_error_message: String,
    },
}

/// A container image found in a live workload, with enough addressing
/// information for a report to point an operator at the owning object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ImageUsage {
    pub image: String,
    pub namespace: String,
    pub workload_kind: &'static str,
    pub workload_name: String,
    pub container_name: String,
    pub is_init_container: bool,
    /// Filled in by the classifier once the scan is joined with
    /// classification; `false` for every usage straight off the
    /// cluster scan.
    pub is_public: bool,
}

impl ImageUsage {
    pub fn classified(mut self, is_public: bool) -> Self {
        self.is_public = is_public;
        self
    }
}

pub struct ClusterScanner {
    client: Client,
}

impl ClusterScanner {
    pub fn connect() -> Result<Self, ClusterError> {
        let client = block_on(Client::try_default()).map_err(|err| ClusterError::ConnectionFailed(err.to_string()))?;
        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// Lists every distinct image usage across Deployments, StatefulSets,
    /// DaemonSets, Jobs and CronJobs, optionally restricted to one
    /// namespace. Results are deduplicated by `(image, namespace, kind,
    /// workload, container)` so a CronJob's nested `JobTemplate` doesn't
    /// double count.
    pub fn scan(&self, namespace: Option<&str>) -> Result<Vec<ImageUsage>, ClusterError> {
        let mut usages = BTreeSet::new();

        usages.extend(self.scan_deployments(namespace)?);
        usages.extend(self.scan_stateful_sets(namespace)?);
        usages.extend(self.scan_daemon_sets(namespace)?);
        usages.extend(self.scan_jobs(namespace)?);
        usages.extend(self.scan_cron_jobs(namespace)?);

        info!(count = usages.len(), namespace = ?namespace, "scanned cluster for image usage");
        Ok(usages.into_iter().collect())
    }

    fn scan_deployments(&self, namespace: Option<&str>) -> Result<Vec<ImageUsage>, ClusterError> {
        let api: Api<Deployment> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let list = block_on(api.list(&ListParams::default())).map_err(|err| ClusterError::ListFailed {
            workload_kind: "Deployment",
            namespace: namespace.map(str::to_string),
            raw_error_message: err.to_string(),
        })?;

        let mut usages = Vec::new();
        for item in list {
            let ns = item.metadata.namespace.clone().unwrap_or_default();
            let name = item.metadata.name.clone().unwrap_or_default();
            let template = item.spec.as_ref().map(|s| &s.template);
            if let Some(template) = template {
                usages.extend(images_from_pod_template("Deployment", &ns, &name, template));
            }
        }
        Ok(usages)
    }

    fn scan_stateful_sets(&self, namespace: Option<&str>) -> Result<Vec<ImageUsage>, ClusterError> {
        let api: Api<StatefulSet> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let list = block_on(api.list(&ListParams::default())).map_err(|err| ClusterError::ListFailed {
            workload_kind: "StatefulSet",
            namespace: namespace.map(str::to_string),
            raw_error_message: err.to_string(),
        })?;

        let mut usages = Vec::new();
        for item in list {
            let ns = item.metadata.namespace.clone().unwrap_or_default();
            let name = item.metadata.name.clone().unwrap_or_default();
            if let Some(template) = item.spec.as_ref().map(|s| &s.template) {
                usages.extend(images_from_pod_template("StatefulSet", &ns, &name, template));
            }
        }
        Ok(usages)
    }

    fn scan_daemon_sets(&self, namespace: Option<&str>) -> Result<Vec<ImageUsage>, ClusterError> {
        let api: Api<DaemonSet> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let list = block_on(api.list(&ListParams::default())).map_err(|err| ClusterError::ListFailed {
            workload_kind: "DaemonSet",
            namespace: namespace.map(str::to_string),
            raw_error_message: err.to_string(),
        })?;

        let mut usages = Vec::new();
        for item in list {
            let ns = item.metadata.namespace.clone().unwrap_or_default();
            let name = item.metadata.name.clone().unwrap_or_default();
            if let Some(template) = item.spec.as_ref().map(|s| &s.template) {
                usages.extend(images_from_pod_template("DaemonSet", &ns, &name, template));
            }
        }
        Ok(usages)
    }

    fn scan_jobs(&self, namespace: Option<&str>) -> Result<Vec<ImageUsage>, ClusterError> {
        let api: Api<Job> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let list = block_on(api.list(&ListParams::default())).map_err(|err| ClusterError::ListFailed {
            workload_kind: "Job",
            namespace: namespace.map(str::to_string),
            raw_error_message: err.to_string(),
        })?;

        let mut usages = Vec::new();
        for item in list {
            let ns = item.metadata.namespace.clone().unwrap_or_default();
            let name = item.metadata.name.clone().unwrap_or_default();
            if let Some(template) = item.spec.as_ref().map(|s| &s.template) {
                usages.extend(images_from_pod_template("Job", &ns, &name, template));
            }
        }
        Ok(usages)
    }

    fn scan_cron_jobs(&self, namespace: Option<&str>) -> Result<Vec<ImageUsage>, ClusterError> {
        let api: Api<CronJob> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let list = block_on(api.list(&ListParams::default())).map_err(|err| ClusterError::ListFailed {
            workload_kind: "CronJob",
            namespace: namespace.map(str::to_string),
            raw_error_message: err.to_string(),
        })?;

        let mut usages = Vec::new();
        for item in list {
            let ns = item.metadata.namespace.clone().unwrap_or_default();
            let name = item.metadata.name.clone().unwrap_or_default();
            let template = item
                .spec
                .as_ref()
                .and_then(|s| s.job_template.spec.as_ref())
                .map(|s| &s.template);
            if let Some(template) = template {
                usages.extend(images_from_pod_template("CronJob", &ns, &name, template));
            } else {
                warn!(namespace = %ns, cronjob = %name, "cronjob has no pod template, skipping");
            }
        }
        Ok(usages)
    }
}

fn images_from_pod_template(
    workload_kind: &'static str,
    namespace: &str,
    workload_name: &str,
    template: &PodTemplateSpec,
) -> Vec<ImageUsage> {
    let Some(spec) = template.spec.as_ref() else {
        return Vec::new();
    };

    let regular = spec.containers.iter().map(|c| (c, false));
    let init = spec.init_containers.iter().flatten().map(|c| (c, true));

    regular
        .chain(init)
        .filter_map(|(container, is_init_container)| {
            container.image.as_ref().map(|image| ImageUsage {
                image: image.clone(),
                namespace: namespace.to_string(),
                workload_kind,
                workload_name: workload_name.to_string(),
                container_name: container.name.clone(),
                is_init_container,
                is_public: false,
            })
        })
        .collect()
}
