use std::collections::HashMap;

use serde_json::json;
use tracing::{debug, warn};

use crate::control_plane::{ControlPlane, Endpoint, Method, RemoteList};
use crate::error::{ElestioError, Result};

pub mod api_types;

pub use api_types::{CiCdTarget, PipelineSummary};

/// # Errors
///
/// Propagates control-plane failures.
pub async fn list_targets(api: &dyn ControlPlane, project_id: &str) -> Result<Vec<CiCdTarget>> {
    let value = api
        .call(
            Endpoint::ListTargets,
            Method::Post,
            json!({ "projectId": project_id }),
        )
        .await?;
    RemoteList::from_value(Endpoint::ListTargets.name(), value)
}

/// # Errors
///
/// Propagates control-plane failures.
pub async fn list_pipelines(
    api: &dyn ControlPlane,
    project_id: &str,
    vm_id: &str,
) -> Result<Vec<PipelineSummary>> {
    let value = api
        .call(
            Endpoint::ListPipelines,
            Method::Post,
            json!({ "projectId": project_id, "vmID": vm_id }),
        )
        .await?;
    RemoteList::from_value(Endpoint::ListPipelines.name(), value)
}

/// Listings of one project's targets and their pipelines, fetched at most
/// once per run.
#[derive(Debug)]
pub struct ProjectScan {
    project_id: String,
    targets: Option<Vec<CiCdTarget>>,
    pipelines: HashMap<String, Vec<PipelineSummary>>,
}

impl ProjectScan {
    #[must_use]
    pub fn new(project_id: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            targets: None,
            pipelines: HashMap::new(),
        }
    }

    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// # Errors
    ///
    /// Propagates control-plane failures of the first listing.
    pub async fn targets(&mut self, api: &dyn ControlPlane) -> Result<&[CiCdTarget]> {
        if self.targets.is_none() {
            let targets = list_targets(api, &self.project_id).await?;
            debug!(
                project_id = %self.project_id,
                count = targets.len(),
                "listed CI/CD targets"
            );
            self.targets = Some(targets);
        }
        Ok(self.targets.as_deref().unwrap_or_default())
    }

    /// # Errors
    ///
    /// Returns [`ElestioError::TargetNotFound`] when no target in the project
    /// carries `vm_id`.
    pub async fn find_target(&mut self, api: &dyn ControlPlane, vm_id: &str) -> Result<CiCdTarget> {
        let project_id = self.project_id.clone();
        self.targets(api)
            .await?
            .iter()
            .find(|target| target.vm_id == vm_id)
            .cloned()
            .ok_or_else(|| ElestioError::TargetNotFound {
                vm_id: vm_id.to_string(),
                project_id,
            })
    }

    /// Pipelines on one target. A failed listing is logged and treated as
    /// empty, so one unreachable target does not stop a scan.
    pub async fn pipelines(&mut self, api: &dyn ControlPlane, vm_id: &str) -> &[PipelineSummary] {
        if !self.pipelines.contains_key(vm_id) {
            let listed = match list_pipelines(api, &self.project_id, vm_id).await {
                Ok(pipelines) => pipelines,
                Err(error) => {
                    warn!(vm_id, %error, "skipping target whose pipelines could not be listed");
                    Vec::new()
                }
            };
            self.pipelines.insert(vm_id.to_string(), listed);
        }
        self.pipelines
            .get(vm_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeControlPlane;
    use serde_json::Value;

    fn two_targets() -> FakeControlPlane {
        FakeControlPlane::new(|endpoint, body| match endpoint {
            Endpoint::ListTargets => Ok(json!([
                { "vmID": "1", "displayName": "one", "projectID": body["projectId"] },
                { "vmID": "2", "displayName": "two", "projectID": body["projectId"] }
            ])),
            Endpoint::ListPipelines if body["vmID"] == "2" => Err(ElestioError::remote_call(
                Endpoint::ListPipelines.name(),
                "vm unreachable",
            )),
            Endpoint::ListPipelines => Ok(json!({ "status": "OK", "data": [
                { "pipelineName": "site", "gitType": "GITHUB", "authID": 5 }
            ] })),
            _ => Ok(Value::Null),
        })
    }

    #[tokio::test]
    async fn scan_lists_targets_once() {
        let api = two_targets();
        let mut scan = ProjectScan::new("4242");

        assert_eq!(scan.targets(&api).await.expect("targets").len(), 2);
        let target = scan.find_target(&api, "2").await.expect("target 2");
        assert_eq!(target.display_name, "two");
        assert_eq!(target.project_id.as_deref(), Some("4242"));

        assert_eq!(api.calls_to(Endpoint::ListTargets), 1);
    }

    #[tokio::test]
    async fn find_target_reports_missing_vm() {
        let api = two_targets();
        let mut scan = ProjectScan::new("4242");

        let error = scan.find_target(&api, "99").await.expect_err("missing");
        assert!(matches!(
            error,
            ElestioError::TargetNotFound { ref vm_id, ref project_id }
                if vm_id == "99" && project_id == "4242"
        ));
    }

    #[tokio::test]
    async fn pipeline_listing_failures_are_cached_as_empty() {
        let api = two_targets();
        let mut scan = ProjectScan::new("4242");

        assert_eq!(scan.pipelines(&api, "1").await.len(), 1);
        assert!(scan.pipelines(&api, "2").await.is_empty());
        assert!(scan.pipelines(&api, "2").await.is_empty());
        assert_eq!(scan.pipelines(&api, "1").await[0].usable_auth_id(), Some("5"));

        assert_eq!(api.calls_to(Endpoint::ListPipelines), 2);
    }
}
