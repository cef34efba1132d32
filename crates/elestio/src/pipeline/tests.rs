use super::*;

use serde_json::json;

use crate::fakes::FakeControlPlane;

fn widgets_repository() -> Repository {
    serde_json::from_value(json!({
        "id": 9001,
        "name": "widgets",
        "full_name": "acme/widgets",
        "owner": { "login": "acme" },
        "default_branch": "develop"
    }))
    .expect("repository")
}

fn request(mode: DeployMode, source: Option<GitSource>) -> PipelineRequest {
    PipelineRequest {
        mode,
        pipeline_name: "widgets-app".to_string(),
        vm_id: "12345678".to_string(),
        project_id: "4242".to_string(),
        source,
        overrides: PipelineOverrides::default(),
    }
}

fn github_source() -> Option<GitSource> {
    Some(GitSource {
        repository: widgets_repository(),
        auth_id: "77".to_string(),
    })
}

#[test]
fn github_static_spec_matches_wire_contract() {
    let spec = build_spec(&request(DeployMode::GitHub, github_source())).expect("spec");
    let wire = serde_json::to_value(&spec).expect("serialize");

    assert_eq!(wire["CICDMode"], "GITHUB");
    assert_eq!(wire["isNeedToCreateRepo"], false);
    assert_eq!(wire["pipelineName"], "widgets-app");
    assert_eq!(wire["vmID"], "12345678");
    assert_eq!(wire["projectId"], "4242");
    assert_eq!(
        wire["configData"],
        json!({
            "buildCommand": "npm run build",
            "buildDir": "/dist",
            "installCommand": "npm install",
            "runCommand": "",
            "framework": "",
            "version": "",
            "runtime": "staticSPA"
        })
    );
    assert_eq!(
        wire["gitData"],
        json!({
            "projectName": "widgets-app",
            "branch": "develop",
            "repoUrl": "https://github.com/acme/widgets",
            "repo": "acme/widgets",
            "repoId": "9001",
            "owner": "acme",
            "authID": "77"
        })
    );
    assert_eq!(
        wire["ports"],
        json!([{
            "protocol": "HTTPS",
            "targetProtocol": "HTTP",
            "listeningPort": 443,
            "targetPort": 3000,
            "targetIP": "172.17.0.1",
            "public": true,
            "path": "/"
        }])
    );
    assert_eq!(
        wire["exposedPorts"],
        json!([{ "protocol": "HTTP", "hostPort": 3000, "containerPort": 3000, "interface": "172.17.0.1" }])
    );
    assert_eq!(wire["variables"], "");
}

#[test]
fn docker_spec_creates_repository_with_empty_config() {
    let spec = build_spec(&request(DeployMode::Docker, None)).expect("spec");
    let wire = serde_json::to_value(&spec).expect("serialize");

    assert_eq!(wire["CICDMode"], "DOCKER");
    assert_eq!(wire["isNeedToCreateRepo"], true);
    assert_eq!(wire["gitData"]["repo"], "");
    assert_eq!(wire["gitData"]["repoUrl"], "");
    assert_eq!(wire["gitData"]["branch"], "main");
    for (key, value) in wire["configData"].as_object().expect("config object") {
        assert_eq!(value, "", "configData.{key} should be empty");
    }
    assert_eq!(wire["exposedPorts"][0]["containerPort"], 80);
    assert_eq!(wire["ports"][0]["listeningPort"], 443);
    assert_eq!(wire["ports"][0]["targetPort"], 3000);
}

#[test]
fn every_mode_keeps_the_port_contract() {
    for mode in DeployMode::ALL {
        let source = mode.provider().map(|_| GitSource {
            repository: widgets_repository(),
            auth_id: "77".to_string(),
        });
        let spec = build_spec(&request(mode, source)).expect("spec");

        assert_eq!(spec.ports, vec![PortMapping::public_https()]);
        let expected_container = if mode == DeployMode::Docker { 80 } else { 3000 };
        assert_eq!(spec.exposed_ports[0].container_port, expected_container);
        assert_eq!(spec.exposed_ports[0].host_port, INTERNAL_PORT);
    }
}

#[test]
fn overrides_replace_defaults_field_by_field() {
    let mut fullstack = request(
        DeployMode::GitLabFullstack,
        Some(GitSource {
            repository: widgets_repository(),
            auth_id: "5".to_string(),
        }),
    );
    fullstack.overrides = PipelineOverrides {
        branch: Some("release/2.x".to_string()),
        run_command: Some("node server.js".to_string()),
        version: Some("22".to_string()),
        build_dir: Some("  ".to_string()),
        ..PipelineOverrides::default()
    };

    let spec = build_spec(&fullstack).expect("spec");

    assert_eq!(spec.config.run_command, "node server.js");
    assert_eq!(spec.config.build_command, "npm run build");
    assert_eq!(spec.config.build_dir, "/");
    assert_eq!(spec.config.version, "22");
    assert_eq!(spec.config.runtime, "node");
    assert_eq!(spec.git.branch, "release/2.x");
    assert_eq!(spec.git.repo_url, "https://gitlab.com/acme/widgets");
}

#[test]
fn docker_overrides_are_forwarded() {
    let mut docker = request(DeployMode::Docker, None);
    docker.overrides.build_command = Some("make image".to_string());

    let spec = build_spec(&docker).expect("spec");

    assert_eq!(spec.config.build_command, "make image");
    assert_eq!(spec.config.build_dir, "");
}

#[test]
fn validation_rejects_bad_input() {
    let mut bad_name = request(DeployMode::GitHub, github_source());
    bad_name.pipeline_name = "Widgets_App".to_string();
    assert!(matches!(build_spec(&bad_name), Err(ElestioError::InvalidInput(_))));

    let mut bad_branch = request(DeployMode::GitHub, github_source());
    bad_branch.overrides.branch = Some("main; rm -rf /".to_string());
    assert!(matches!(build_spec(&bad_branch), Err(ElestioError::InvalidInput(_))));

    let missing_repo = request(DeployMode::GitHub, None);
    assert!(matches!(build_spec(&missing_repo), Err(ElestioError::InvalidInput(_))));

    let docker_with_repo = request(DeployMode::Docker, github_source());
    assert!(matches!(build_spec(&docker_with_repo), Err(ElestioError::InvalidInput(_))));

    let mut no_project = request(DeployMode::Docker, None);
    no_project.project_id = String::new();
    assert!(matches!(build_spec(&no_project), Err(ElestioError::MissingConfig(_))));
}

#[test]
fn name_validator_accepts_slugs() {
    for name in ["a", "widgets-app", "0day", "app-2"] {
        assert!(validate_pipeline_name(name).is_ok(), "{name} should pass");
    }
    for name in ["", "-app", "App", "my app", "app_1"] {
        assert!(validate_pipeline_name(name).is_err(), "{name:?} should fail");
    }
}

#[tokio::test]
async fn create_accepts_identified_response() {
    let api = FakeControlPlane::new(|_, _| {
        Ok(json!({ "data": { "pipelineID": 314, "url": "https://widgets-app.vm.elestio.app" } }))
    });
    let spec = build_spec(&request(DeployMode::GitHub, github_source())).expect("spec");

    let created = create(&api, &spec).await.expect("created");

    assert_eq!(created.pipeline_id.as_deref(), Some("314"));
    assert_eq!(created.url.as_deref(), Some("https://widgets-app.vm.elestio.app"));
    let body = &api.bodies(Endpoint::CreatePipeline)[0];
    assert_eq!(body["pipelineName"], "widgets-app");
    assert_eq!(body["gitData"]["authID"], "77");
}

#[tokio::test]
async fn create_accepts_bare_ok_status() {
    let api = FakeControlPlane::new(|_, _| Ok(json!({ "status": "OK", "message": "Pipeline queued" })));
    let spec = build_spec(&request(DeployMode::Docker, None)).expect("spec");

    let created = create(&api, &spec).await.expect("created");

    assert_eq!(created.pipeline_id, None);
    assert_eq!(created.message.as_deref(), Some("Pipeline queued"));
}

#[tokio::test]
async fn create_failure_keeps_remote_message() {
    let api = FakeControlPlane::new(|_, _| Ok(json!({ "message": "Pipeline name already used" })));
    let spec = build_spec(&request(DeployMode::Docker, None)).expect("spec");

    let error = create(&api, &spec).await.expect_err("should fail");

    assert!(matches!(
        error,
        ElestioError::RemoteCallFailed { ref endpoint, ref message }
            if endpoint == "cicd.create_pipeline" && message == "Pipeline name already used"
    ));
}
