//! Integration tests for devcycle

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::Path;
    use tempfile::TempDir;

    const PROJECT: &str = r#"
[cluster]
local_contexts = ["kind-*"]

[images.api]
image = "registry.example.com/team/api"

[[deployments]]
name = "api"

[deployments.helm.chart]
name = "./chart"
"#;

    fn devcycle(dir: &Path) -> Command {
        let mut cmd = cargo_bin_cmd!("devcycle");
        cmd.current_dir(dir).env_remove("DEVCYCLE_CONFIG");
        cmd
    }

    fn project(content: &str) -> TempDir {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("devcycle.toml"), content).unwrap();
        temp
    }

    #[test]
    fn help_displays() {
        let temp = TempDir::new().unwrap();
        devcycle(temp.path())
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("incremental build and deploy"));
    }

    #[test]
    fn version_displays() {
        let temp = TempDir::new().unwrap();
        devcycle(temp.path())
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("devcycle"));
    }

    #[test]
    fn missing_config_fails_with_hint() {
        let temp = TempDir::new().unwrap();
        devcycle(temp.path())
            .arg("deploy")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Configuration file not found"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn invalid_config_is_reported() {
        let temp = project("deployments = 3\n");
        devcycle(temp.path())
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn config_path_from_subdirectory() {
        let temp = project(PROJECT);
        let nested = temp.path().join("src").join("handlers");
        std::fs::create_dir_all(&nested).unwrap();

        devcycle(&nested)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("devcycle.toml"));
    }

    #[test]
    fn config_show_prints_toml() {
        let temp = project(PROJECT);
        devcycle(temp.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cluster]"))
            .stdout(predicate::str::contains("registry.example.com/team/api"));
    }

    #[test]
    fn explicit_config_flag() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("other.toml"), PROJECT).unwrap();
        devcycle(temp.path())
            .args(["--config", "other.toml", "config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("other.toml"));
    }

    #[test]
    fn deployment_without_method_fails_status() {
        let temp = project("[[deployments]]\nname = \"broken\"\n");
        devcycle(temp.path())
            .args(["status", "--context", "kind-dev", "--namespace", "dev"])
            .assert()
            .failure()
            .stderr(predicate::str::contains(
                "deployment broken has no deployment method",
            ));
    }

    #[test]
    fn render_without_deployments_is_empty() {
        let temp = project("[cluster]\n");
        devcycle(temp.path())
            .args(["render", "--context", "kind-dev", "--namespace", "dev"])
            .assert()
            .success()
            .stdout(predicate::str::is_empty());
    }
}
