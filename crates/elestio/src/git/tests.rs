use super::*;

use crate::fakes::FakeControlPlane;

fn repository(name: &str, full_name: &str) -> Value {
    json!({
        "id": 101,
        "name": name,
        "full_name": full_name,
        "owner": { "login": full_name.split('/').next().unwrap_or_default() },
        "clone_url": format!("https://github.com/{full_name}.git"),
        "default_branch": "trunk"
    })
}

/// Three targets, each with two pipelines; only the third target carries a
/// GitHub pipeline with an authorization.
fn project_with_one_authorization() -> FakeControlPlane {
    FakeControlPlane::new(|endpoint, body| match endpoint {
        Endpoint::ListTargets => Ok(json!([
            { "vmID": "1" }, { "vmID": "2" }, { "vmID": "3" }
        ])),
        Endpoint::ListPipelines => {
            let vm_id = body["vmID"].as_str().unwrap_or_default();
            let pipelines = match vm_id {
                "1" => json!([
                    { "pipelineName": "a", "gitType": "GITLAB", "authID": 10 },
                    { "pipelineName": "b", "CICDMode": "DOCKER", "authID": 11 }
                ]),
                "2" => json!([
                    { "pipelineName": "c", "gitType": "GITHUB", "authID": 0 },
                    { "pipelineName": "d", "gitType": "GITHUB" }
                ]),
                _ => json!([
                    { "pipelineName": "e", "gitType": "github", "authID": "77" },
                    { "pipelineName": "f", "gitType": "GITHUB", "authID": "78" }
                ]),
            };
            Ok(json!({ "status": "OK", "data": pipelines }))
        }
        _ => Ok(Value::Null),
    })
}

#[test]
fn provider_parses_case_insensitively() {
    assert_eq!("GitHub".parse::<GitProvider>().expect("github"), GitProvider::GitHub);
    assert_eq!(" gitlab ".parse::<GitProvider>().expect("gitlab"), GitProvider::GitLab);
    assert!("bitbucket".parse::<GitProvider>().is_err());
    assert_eq!(GitProvider::GitLab.host(), "gitlab.com");
    assert_eq!(
        serde_json::to_value(GitProvider::GitHub).expect("serialize"),
        json!("GITHUB")
    );
}

#[test]
fn repo_reference_requires_two_segments() {
    let reference = RepoReference::parse("acme/site").expect("valid");
    assert_eq!(reference.owner, "acme");
    assert_eq!(reference.name, "site");

    for input in ["nodash", "a/b/c", "/site", "acme/", "", " / "] {
        assert!(
            matches!(RepoReference::parse(input), Err(ElestioError::InvalidRepoFormat(_))),
            "{input:?} should be rejected"
        );
    }
}

#[test]
fn accounts_deserialize_from_strings_and_objects() {
    let accounts = serde_json::from_value::<Vec<GitAccount>>(json!([
        "plain",
        { "login": "octo" },
        { "path": "group", "name": "Group Display" },
        { "username": "someone" }
    ]))
    .expect("deserialize");

    let names = accounts.iter().map(|account| account.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, ["plain", "octo", "group", "someone"]);
}

#[test]
fn gitlab_repositories_normalize_names() {
    let repository = serde_json::from_value::<Repository>(json!({
        "id": 55,
        "name": "api",
        "path_with_namespace": "platform/api",
        "namespace": { "path": "platform" },
        "http_url_to_repo": "https://gitlab.com/platform/api.git"
    }))
    .expect("deserialize");

    assert_eq!(repository.id, "55");
    assert_eq!(repository.full_name, "platform/api");
    assert_eq!(repository.owner, "platform");
    assert_eq!(
        repository.clone_url.as_deref(),
        Some("https://gitlab.com/platform/api.git")
    );
    assert_eq!(repository.default_branch, None);
}

#[test]
fn repositories_without_full_name_use_owner() {
    let repository = serde_json::from_value::<Repository>(json!({
        "name": "site",
        "owner": { "login": "acme" }
    }))
    .expect("deserialize");

    assert_eq!(repository.full_name, "acme/site");
    assert_eq!(repository.id, "");
}

#[tokio::test]
async fn finds_the_single_authorization_across_targets() {
    let api = project_with_one_authorization();
    let mut scan = ProjectScan::new("4242");

    let auth_id = find_authorization(&api, &mut scan, GitProvider::GitHub)
        .await
        .expect("scan");

    assert_eq!(auth_id.as_deref(), Some("77"));
    assert_eq!(api.calls_to(Endpoint::ListTargets), 1);
    assert_eq!(api.calls_to(Endpoint::ListPipelines), 3);
}

#[tokio::test]
async fn scan_reuses_cached_listings() {
    let api = project_with_one_authorization();
    let mut scan = ProjectScan::new("4242");

    let gitlab = find_authorization(&api, &mut scan, GitProvider::GitLab)
        .await
        .expect("gitlab scan");
    let github = find_authorization(&api, &mut scan, GitProvider::GitHub)
        .await
        .expect("github scan");

    assert_eq!(gitlab.as_deref(), Some("10"));
    assert_eq!(github.as_deref(), Some("77"));
    assert_eq!(api.calls_to(Endpoint::ListTargets), 1);
    assert_eq!(api.calls_to(Endpoint::ListPipelines), 3);
}

#[tokio::test]
async fn no_authorization_is_none() {
    let api = FakeControlPlane::new(|endpoint, _| match endpoint {
        Endpoint::ListTargets => Ok(json!([{ "vmID": "1" }, { "vmID": "2" }])),
        Endpoint::ListPipelines => Ok(json!([{ "pipelineName": "x", "gitType": "GITLAB", "authID": 3 }])),
        _ => Ok(Value::Null),
    });
    let mut scan = ProjectScan::new("4242");

    let auth_id = find_authorization(&api, &mut scan, GitProvider::GitHub)
        .await
        .expect("scan");

    assert_eq!(auth_id, None);
    assert_eq!(api.calls_to(Endpoint::ListPipelines), 2);
}

#[tokio::test]
async fn empty_project_has_no_authorization() {
    let api = FakeControlPlane::new(|_, _| Ok(json!({ "status": "OK", "data": [] })));
    let mut scan = ProjectScan::new("4242");

    let auth_id = find_authorization(&api, &mut scan, GitProvider::GitHub)
        .await
        .expect("scan");

    assert_eq!(auth_id, None);
    assert_eq!(api.total_calls(), 1);
}

#[tokio::test]
async fn resolves_owner_and_name_against_listing() {
    let api = FakeControlPlane::new(|endpoint, body| {
        assert_eq!(endpoint, Endpoint::ListGitRepositories);
        assert_eq!(body["account"], "owner");
        assert_eq!(body["gitType"], "GITHUB");
        assert_eq!(body["authID"], "77");
        Ok(json!([repository("Repo", "Owner/Repo")]))
    });

    let repository = resolve_repository(&api, "77", GitProvider::GitHub, "owner/repo", "4242")
        .await
        .expect("resolved");

    assert_eq!(repository.name, "Repo");
    assert_eq!(repository.full_name, "Owner/Repo");
    assert_eq!(repository.id, "101");
    assert_eq!(repository.default_branch.as_deref(), Some("trunk"));
}

#[tokio::test]
async fn malformed_repo_makes_no_calls() {
    let api = FakeControlPlane::new(|_, _| Ok(json!([])));

    let error = resolve_repository(&api, "77", GitProvider::GitHub, "nodash", "4242")
        .await
        .expect_err("invalid");

    assert!(matches!(error, ElestioError::InvalidRepoFormat(ref input) if input == "nodash"));
    assert_eq!(api.total_calls(), 0);
}

#[tokio::test]
async fn missing_repo_lists_what_is_visible() {
    let api = FakeControlPlane::new(|_, _| {
        Ok(json!({
            "status": "OK",
            "repositories": [repository("site", "acme/site"), repository("api", "acme/api")]
        }))
    });

    let error = resolve_repository(&api, "77", GitProvider::GitHub, "acme/blog", "4242")
        .await
        .expect_err("not found");

    match error {
        ElestioError::RepoNotFound { repo, available } => {
            assert_eq!(repo, "acme/blog");
            assert_eq!(available, ["acme/site", "acme/api"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn exact_full_name_wins_over_name_only_match() {
    let repositories = vec![
        serde_json::from_value::<Repository>(repository("site", "other/site")).expect("first"),
        serde_json::from_value::<Repository>(repository("site", "Acme/Site")).expect("second"),
    ];
    let reference = RepoReference::parse("acme/site").expect("valid");

    let matched = match_repository(repositories, &reference).expect("matched");
    assert_eq!(matched.full_name, "Acme/Site");
}

#[test]
fn name_only_match_is_the_fallback() {
    let repositories = vec![
        serde_json::from_value::<Repository>(repository("tools", "acme/tools")).expect("first"),
        serde_json::from_value::<Repository>(repository("Site", "other/Site")).expect("second"),
    ];
    let reference = RepoReference::parse("acme/site").expect("valid");

    let matched = match_repository(repositories, &reference).expect("matched");
    assert_eq!(matched.full_name, "other/Site");
}

#[test]
fn account_choice_takes_the_first_listed() {
    let accounts = vec![
        GitAccount { name: "personal".to_string() },
        GitAccount { name: "Acme".to_string() },
    ];

    assert_eq!(pick_account(&accounts).map(|a| a.name.as_str()), Some("personal"));
    assert_eq!(pick_account(&[]), None);
}
