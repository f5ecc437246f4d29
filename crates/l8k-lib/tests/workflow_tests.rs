//! End-to-end workflow tests with in-memory cluster, provider and LLM fakes

use anyhow::Result;
use async_trait::async_trait;
use l8k_lib::cluster::ClusterApi;
use l8k_lib::config::{
    ClusterConfig, DeploymentType, Fabric, LaunchKubernetesConfig, Requirements,
};
use l8k_lib::llm::{ChatMessage, CompletionClient, LineSource, LlmFields};
use l8k_lib::profiles::ResolvedProfile;
use l8k_lib::ui::SilentOutput;
use l8k_lib::{
    LaunchError, LauncherBuilder, Options, Outcome, Phase, Provider, ProviderRegistry, Report,
    RunContext,
};
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const USER_CONFIG: &str = r#"networkOperator:
  version: v25.10.0
  componentVersion: network-operator-v25.10.0
  repository: nvcr.io/nvidia/mellanox
  namespace: nvidia-network-operator
sriov:
  ethernetMtu: 9000
  infinibandMtu: 4000
  numVfs: 8
  priority: 90
  resourceName: sriov_resource
  networkName: sriov_network
clusterConfig:
  capabilities:
    nodes:
      sriov: true
      rdma: true
  workerNodes:
    - worker-1
"#;

const DEFAULTS_CONFIG: &str = r#"networkOperator:
  version: v25.10.0
  componentVersion: network-operator-v25.10.0
  repository: nvcr.io/nvidia/mellanox
  namespace: custom-operator-ns
profile:
  fabric: infiniband
"#;

const TEMPLATE: &str =
    "profile: {{ profileName }}\nresource: {{ sriov.resourceName }}\nfabric: {{ profile.fabric }}\n";

/// Workspace holding a configuration document, a catalog and an output root
struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new(rdma_predicate: bool) -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("cluster-config.yaml"), USER_CONFIG).unwrap();
        std::fs::write(dir.path().join("l8k-config.yaml"), DEFAULTS_CONFIG).unwrap();
        std::fs::write(dir.path().join("system-prompt"), "You select network profiles.").unwrap();

        let entry = dir.path().join("profiles").join("10-sriov-ethernet");
        std::fs::create_dir_all(&entry).unwrap();
        std::fs::write(
            entry.join("profile.yaml"),
            format!(
                r#"name: sriov-ethernet
description: SR-IOV on Ethernet
version: "1"
plugin: network-operator
profileRequirements:
  fabric: ethernet
  deployment: sriov
nodeCapabilities:
  sriov: true
  rdma: {}
deploymentGuide: README.md
templates:
  - sriov-network.yaml.tmpl
"#,
                rdma_predicate
            ),
        )
        .unwrap();
        std::fs::write(entry.join("sriov-network.yaml.tmpl"), TEMPLATE).unwrap();
        std::fs::write(entry.join("README.md"), "# SR-IOV Ethernet\n").unwrap();

        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn options(&self) -> Options {
        Options {
            user_config: Some(self.path("cluster-config.yaml")),
            defaults_config: self.path("l8k-config.yaml"),
            system_prompt: self.path("system-prompt"),
            profiles_dir: self.path("profiles"),
            save_deployment_files: Some(self.path("out")),
            ..Default::default()
        }
    }

    fn flag_options(&self) -> Options {
        Options {
            fabric: Some("ethernet".to_string()),
            deployment_type: Some("sriov".to_string()),
            ..self.options()
        }
    }
}

fn launcher(options: Options) -> LauncherBuilder {
    LauncherBuilder::new(options).ui(Arc::new(SilentOutput))
}

fn completed(outcome: Outcome) -> Report {
    match outcome {
        Outcome::Completed(report) => report,
        other => panic!("expected a completed run, got {:?}", other),
    }
}

#[derive(Default)]
struct FakeCluster {
    discovered: ClusterConfig,
    namespaces: Mutex<Vec<String>>,
    applied: Mutex<Vec<(PathBuf, Vec<String>)>>,
}

impl FakeCluster {
    fn with_nodes(nodes: &[&str]) -> Self {
        let mut discovered = ClusterConfig::default();
        discovered.worker_nodes = nodes.iter().map(|n| n.to_string()).collect();
        discovered.capabilities.nodes.sriov = Some(true);
        discovered.capabilities.nodes.rdma = Some(false);
        Self {
            discovered,
            ..Default::default()
        }
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn discover(&self, namespace: &str) -> Result<ClusterConfig> {
        self.namespaces.lock().unwrap().push(namespace.to_string());
        Ok(self.discovered.clone())
    }

    async fn apply(&self, manifests_dir: &Path) -> Result<usize> {
        let mut files: Vec<String> = std::fs::read_dir(manifests_dir)?
            .map(|e| e.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<std::io::Result<_>>()?;
        files.sort();
        let count = files.len();
        self.applied
            .lock()
            .unwrap()
            .push((manifests_dir.to_path_buf(), files));
        Ok(count)
    }
}

/// Replays canned completions
struct ScriptedLlm {
    responses: Mutex<VecDeque<String>>,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    fn new(responses: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.iter().map(|r| r.to_string()).collect()),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl CompletionClient for ScriptedLlm {
    async fn complete(&self, system_prompt: &str, _: &[ChatMessage], _: &str) -> Result<String> {
        assert!(system_prompt.starts_with("You select network profiles."));
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("no scripted response"))
    }
}

struct ScriptedLines(VecDeque<String>);

#[async_trait]
impl LineSource for ScriptedLines {
    async fn next_line(&mut self, _prompt: &str) -> Result<Option<String>> {
        Ok(self.0.pop_front())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Discover,
    Generate,
    Deploy,
}

/// Provider that counts every call and returns fixed requirements
struct CountingProvider {
    name: &'static str,
    fabric: Fabric,
    fail_at: Option<Stage>,
    calls: AtomicUsize,
}

impl CountingProvider {
    fn new(name: &'static str, fabric: Fabric) -> Arc<Self> {
        Arc::new(Self {
            name,
            fabric,
            fail_at: None,
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(name: &'static str, stage: Stage) -> Arc<Self> {
        Arc::new(Self {
            name,
            fabric: Fabric::Ethernet,
            fail_at: Some(stage),
            calls: AtomicUsize::new(0),
        })
    }

    fn check(&self, stage: Stage) -> Result<()> {
        if self.fail_at == Some(stage) {
            anyhow::bail!("{} failed during {:?}", self.name, stage);
        }
        Ok(())
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Provider for CountingProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn version(&self) -> &str {
        "test"
    }

    fn has_requirements_from_options(&self, _options: &Options) -> bool {
        self.touch();
        true
    }

    fn requirements_from_options(&self, _options: &Options) -> Result<Requirements> {
        self.touch();
        Ok(Requirements {
            fabric: Some(self.fabric),
            ..Default::default()
        })
    }

    fn requirements_from_llm(&self, _fields: &LlmFields) -> Result<Requirements> {
        self.touch();
        Ok(Requirements::default())
    }

    async fn discover(
        &self,
        _ctx: &RunContext,
        _cluster: &dyn ClusterApi,
        _defaults: &LaunchKubernetesConfig,
    ) -> Result<ClusterConfig> {
        self.touch();
        self.check(Stage::Discover)?;
        Ok(ClusterConfig::default())
    }

    fn generate_files(
        &self,
        profile: &ResolvedProfile,
        _config: &LaunchKubernetesConfig,
    ) -> Result<BTreeMap<String, String>> {
        self.touch();
        self.check(Stage::Generate)?;
        Ok(BTreeMap::from([(
            format!("{}.yaml", self.name),
            format!("profile: {}\n", profile.name()),
        )]))
    }

    async fn deploy(
        &self,
        _ctx: &RunContext,
        _profile: &ResolvedProfile,
        _cluster: &dyn ClusterApi,
        _manifests_dir: &Path,
    ) -> Result<()> {
        self.touch();
        self.check(Stage::Deploy)
    }
}

/// Catalog entry without predicates owned by `plugin`
fn add_catch_all_profile(fixture: &Fixture, plugin: &str) {
    let entry = fixture.path("profiles").join(format!("90-{}", plugin));
    std::fs::create_dir_all(&entry).unwrap();
    std::fs::write(
        entry.join("profile.yaml"),
        format!("name: {}-default\nplugin: {}\n", plugin, plugin),
    )
    .unwrap();
}

fn registry(providers: &[&Arc<CountingProvider>]) -> ProviderRegistry {
    ProviderRegistry::with_providers(
        providers
            .iter()
            .map(|p| Arc::clone(p) as Arc<dyn Provider>)
            .collect::<Vec<_>>(),
    )
}

#[tokio::test]
async fn test_scenario_a_flags_resolve_matching_profile() {
    let fixture = Fixture::new(true);

    let report = completed(launcher(fixture.flag_options()).build().unwrap().run().await.unwrap());

    assert_eq!(report.profiles["network-operator"], "sriov-ethernet");
    assert_eq!(report.requirements.fabric, Some(Fabric::Ethernet));
    assert_eq!(report.requirements.deployment, Some(DeploymentType::Sriov));
    assert!(report.deployed.is_empty());

    let generated = &report.generated[0];
    assert_eq!(generated.files, vec!["sriov-network.yaml".to_string()]);
    let out_dir = fixture.path("out").join("network-operator");
    assert_eq!(generated.directory.as_deref(), Some(out_dir.as_path()));
    assert_eq!(
        std::fs::read_to_string(out_dir.join("sriov-network.yaml")).unwrap(),
        "profile: sriov-ethernet\nresource: sriov_resource\nfabric: ethernet\n"
    );
}

#[tokio::test]
async fn test_scenario_b_capability_mismatch_has_no_profile() {
    let fixture = Fixture::new(false);

    let err = launcher(fixture.flag_options())
        .build()
        .unwrap()
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.phase, Phase::Resolution);
    match err.error() {
        LaunchError::NoApplicableProfile {
            provider,
            requirements,
            capabilities,
        } => {
            assert_eq!(provider, "network-operator");
            assert_eq!(requirements.fabric, Some(Fabric::Ethernet));
            assert!(capabilities.nodes.rdma());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!fixture.path("out").exists());
}

#[tokio::test]
async fn test_scenario_c_deploy_without_output_fails_before_providers() {
    let fixture = Fixture::new(true);
    let provider = CountingProvider::new("network-operator", Fabric::Ethernet);
    let options = Options {
        deploy: true,
        save_deployment_files: None,
        ..fixture.flag_options()
    };

    let err = launcher(options)
        .registry(ProviderRegistry::with_providers([provider.clone() as Arc<dyn Provider>]))
        .cluster(Arc::new(FakeCluster::default()))
        .build()
        .err()
        .unwrap();

    assert_eq!(err.phase, Phase::Init);
    assert!(matches!(err.error(), LaunchError::Configuration(_)));
    assert!(err.to_string().contains("--save-deployment-files"));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_scenario_d_low_confidence_aborts_before_resolution() {
    let fixture = Fixture::new(true);
    std::fs::write(fixture.path("prompt.txt"), "Something fast for my cluster").unwrap();
    let llm = ScriptedLlm::new(&[
        r#"```json
{"fabric": "ethernet", "deploymentType": "sriov", "confidence": "low", "reasoning": "workload type is unclear"}
```"#,
    ]);
    let options = Options {
        prompt: Some(fixture.path("prompt.txt")),
        profiles_dir: fixture.path("missing-catalog"),
        ..fixture.options()
    };

    let err = launcher(options)
        .llm(llm.clone())
        .build()
        .unwrap()
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.phase, Phase::RequirementsAcquisition);
    match err.error() {
        LaunchError::LowConfidence { reasoning } => {
            assert_eq!(reasoning, "workload type is unclear")
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    assert!(!fixture.path("out").exists());
}

#[tokio::test]
async fn test_prompt_selects_profile() {
    let fixture = Fixture::new(true);
    std::fs::write(fixture.path("prompt.txt"), "SR-IOV on ethernet").unwrap();
    let llm = ScriptedLlm::new(&[
        r#"I recommend {"fabric": "ethernet", "deploymentType": "sriov", "multirail": false, "confidence": "high"}"#,
    ]);
    let options = Options {
        prompt: Some(fixture.path("prompt.txt")),
        ..fixture.options()
    };

    let report = completed(launcher(options).llm(llm).build().unwrap().run().await.unwrap());
    assert_eq!(report.profiles["network-operator"], "sriov-ethernet");
}

#[tokio::test]
async fn test_flags_take_precedence_over_prompt() {
    let fixture = Fixture::new(true);
    let llm = ScriptedLlm::new(&[]);
    let options = Options {
        prompt: Some(fixture.path("prompt-that-is-never-read.txt")),
        ..fixture.flag_options()
    };

    let report = completed(
        launcher(options)
            .llm(llm.clone())
            .build()
            .unwrap()
            .run()
            .await
            .unwrap(),
    );
    assert_eq!(report.profiles["network-operator"], "sriov-ethernet");
    assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_prompt_without_llm_client_is_configuration_error() {
    let fixture = Fixture::new(true);
    std::fs::write(fixture.path("prompt.txt"), "anything").unwrap();
    let options = Options {
        prompt: Some(fixture.path("prompt.txt")),
        ..fixture.options()
    };

    let err = launcher(options).build().unwrap().run().await.unwrap_err();
    assert_eq!(err.phase, Phase::RequirementsAcquisition);
    assert!(matches!(err.error(), LaunchError::Configuration(_)));
}

#[tokio::test]
async fn test_interactive_session_generates_profile() {
    let fixture = Fixture::new(true);
    let llm = ScriptedLlm::new(&[
        "Which fabric does your cluster use?",
        r#"{"fabric": "ethernet", "deploymentType": "sriov", "confidence": "high"}"#,
    ]);
    let input = ScriptedLines(
        ["I need fast networking", "Ethernet with SR-IOV", "generate"]
            .iter()
            .map(|l| l.to_string())
            .collect(),
    );
    let options = Options {
        llm_interactive: true,
        ..fixture.options()
    };

    let report = completed(
        launcher(options)
            .llm(llm.clone())
            .input(Box::new(input))
            .build()
            .unwrap()
            .run()
            .await
            .unwrap(),
    );
    assert_eq!(report.profiles["network-operator"], "sriov-ethernet");
    assert_eq!(llm.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_interactive_exit_is_configuration_error() {
    let fixture = Fixture::new(true);
    let options = Options {
        llm_interactive: true,
        ..fixture.options()
    };

    let err = launcher(options)
        .llm(ScriptedLlm::new(&[]))
        .input(Box::new(ScriptedLines(VecDeque::from(["exit".to_string()]))))
        .build()
        .unwrap()
        .run()
        .await
        .unwrap_err();
    assert!(err.to_string().contains("session cancelled by user"));
}

#[tokio::test]
async fn test_no_requirement_source_skips_after_discovery() {
    let fixture = Fixture::new(true);
    let cluster = Arc::new(FakeCluster::with_nodes(&["worker-b", "worker-a"]));
    let saved = fixture.path("discovered/cluster-config.yaml");
    let options = Options {
        discover_cluster_config: true,
        user_config: None,
        save_cluster_config: Some(saved.clone()),
        ..fixture.options()
    };

    let outcome = launcher(options)
        .cluster(cluster.clone())
        .build()
        .unwrap()
        .run()
        .await
        .unwrap();

    match outcome {
        Outcome::Skipped { cluster_config } => assert_eq!(cluster_config, Some(saved.clone())),
        other => panic!("expected skipped run, got {:?}", other),
    }
    assert_eq!(
        *cluster.namespaces.lock().unwrap(),
        vec!["custom-operator-ns".to_string()]
    );

    let document = LaunchKubernetesConfig::load(&saved).unwrap();
    assert!(document.profile.is_none());
    assert_eq!(document.network_operator.unwrap().namespace, "custom-operator-ns");
    let discovered = document.cluster_config.unwrap();
    assert_eq!(discovered.worker_nodes, vec!["worker-b", "worker-a"]);
    assert_eq!(
        discovered.node_selector["feature.node.kubernetes.io/pci-15b3.present"],
        "true"
    );
    assert!(discovered.capabilities.nodes.sriov());
    assert!(!discovered.capabilities.nodes.rdma());
}

#[tokio::test]
async fn test_user_config_bypasses_discovery() {
    let fixture = Fixture::new(true);
    let options = Options {
        discover_cluster_config: true,
        ..fixture.options()
    };

    let outcome = launcher(options).build().unwrap().run().await.unwrap();
    match outcome {
        Outcome::Skipped { cluster_config } => {
            assert_eq!(cluster_config, Some(fixture.path("cluster-config.yaml")))
        }
        other => panic!("expected skipped run, got {:?}", other),
    }
}

#[tokio::test]
async fn test_deploy_applies_generated_files() {
    let fixture = Fixture::new(true);
    let cluster = Arc::new(FakeCluster::default());
    let options = Options {
        deploy: true,
        ..fixture.flag_options()
    };

    let report = completed(
        launcher(options)
            .cluster(cluster.clone())
            .build()
            .unwrap()
            .run()
            .await
            .unwrap(),
    );

    assert_eq!(report.deployed, vec!["network-operator".to_string()]);
    let applied = cluster.applied.lock().unwrap();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].0, fixture.path("out").join("network-operator"));
    assert_eq!(applied[0].1, vec!["sriov-network.yaml".to_string()]);
}

#[tokio::test]
async fn test_generation_clears_previous_output() {
    let fixture = Fixture::new(true);
    let stale = fixture.path("out").join("network-operator").join("stale.yaml");
    std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
    std::fs::write(&stale, "old").unwrap();

    launcher(fixture.flag_options()).build().unwrap().run().await.unwrap();

    assert!(!stale.exists());
    assert!(fixture
        .path("out")
        .join("network-operator")
        .join("sriov-network.yaml")
        .exists());
}

#[tokio::test]
async fn test_conflicting_provider_requirements_abort() {
    let fixture = Fixture::new(true);
    let alpha = CountingProvider::new("alpha", Fabric::Ethernet);
    let beta = CountingProvider::new("beta", Fabric::Infiniband);

    let err = launcher(fixture.flag_options())
        .registry(ProviderRegistry::with_providers([
            alpha as Arc<dyn Provider>,
            beta as Arc<dyn Provider>,
        ]))
        .build()
        .unwrap()
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.phase, Phase::RequirementsAcquisition);
    match err.error() {
        LaunchError::Conflict(conflict) => assert_eq!(conflict.field, "fabric"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_cancelled_run_stops_at_discovery() {
    let fixture = Fixture::new(true);
    let cluster = Arc::new(FakeCluster::with_nodes(&["worker-1"]));
    let token = CancellationToken::new();
    token.cancel();
    let options = Options {
        discover_cluster_config: true,
        user_config: None,
        save_cluster_config: Some(fixture.path("discovered.yaml")),
        ..fixture.options()
    };

    let err = launcher(options)
        .cluster(cluster.clone())
        .cancellation(token)
        .build()
        .unwrap()
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.phase, Phase::Discovery);
    assert!(matches!(err.error(), LaunchError::Cancelled));
    assert!(cluster.namespaces.lock().unwrap().is_empty());
    assert!(!fixture.path("discovered.yaml").exists());
}

#[tokio::test]
async fn test_discovery_failure_stops_before_next_provider() {
    let fixture = Fixture::new(true);
    let alpha = CountingProvider::failing("alpha", Stage::Discover);
    let beta = CountingProvider::new("beta", Fabric::Ethernet);
    let saved = fixture.path("discovered.yaml");
    let options = Options {
        discover_cluster_config: true,
        user_config: None,
        save_cluster_config: Some(saved.clone()),
        ..fixture.flag_options()
    };

    let err = launcher(options)
        .registry(registry(&[&alpha, &beta]))
        .cluster(Arc::new(FakeCluster::default()))
        .build()
        .unwrap()
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.phase, Phase::Discovery);
    match err.error() {
        LaunchError::Provider { provider, cause } => {
            assert_eq!(provider, "alpha");
            assert!(cause.to_string().contains("alpha failed during Discover"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(alpha.calls(), 1);
    assert_eq!(beta.calls(), 0);
    assert!(!saved.exists());
}

#[tokio::test]
async fn test_generation_failure_keeps_earlier_provider_files() {
    let fixture = Fixture::new(true);
    add_catch_all_profile(&fixture, "alpha");
    add_catch_all_profile(&fixture, "beta");
    let alpha = CountingProvider::new("alpha", Fabric::Ethernet);
    let beta = CountingProvider::failing("beta", Stage::Generate);

    let err = launcher(fixture.flag_options())
        .registry(registry(&[&alpha, &beta]))
        .build()
        .unwrap()
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.phase, Phase::Generation);
    assert!(matches!(err.error(), LaunchError::Provider { provider, .. } if provider == "beta"));

    let kept = fixture.path("out").join("alpha").join("alpha.yaml");
    assert_eq!(
        std::fs::read_to_string(kept).unwrap(),
        "profile: alpha-default\n"
    );
    assert!(!fixture.path("out").join("beta").exists());
}

#[tokio::test]
async fn test_deploy_failure_is_provider_error() {
    let fixture = Fixture::new(true);
    add_catch_all_profile(&fixture, "alpha");
    let alpha = CountingProvider::failing("alpha", Stage::Deploy);
    let options = Options {
        deploy: true,
        ..fixture.flag_options()
    };

    let err = launcher(options)
        .registry(registry(&[&alpha]))
        .cluster(Arc::new(FakeCluster::default()))
        .build()
        .unwrap()
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.phase, Phase::Deployment);
    assert!(matches!(err.error(), LaunchError::Provider { provider, .. } if provider == "alpha"));
    assert!(fixture.path("out").join("alpha").join("alpha.yaml").exists());
}
