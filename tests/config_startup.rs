//! Startup configuration loading and composition.

use camino::Utf8PathBuf;
use cap_std::{ambient_authority, fs_utf8::Dir};
use orca::config::{ConfigError, ConfigFactory, ConfigSource, Platform, ServiceConfig};
use rstest::{fixture, rstest};
use tempfile::TempDir;

struct ConfigDir {
    _tmp: TempDir,
    root: Utf8PathBuf,
}

impl ConfigDir {
    fn write(&self, relative: &str, contents: &str) -> Utf8PathBuf {
        let dir = Dir::open_ambient_dir(&self.root, ambient_authority())
            .unwrap_or_else(|err| panic!("open {}: {err}", self.root));
        if let Some((parent, _)) = relative.rsplit_once('/') {
            dir.create_dir_all(parent)
                .unwrap_or_else(|err| panic!("create {parent}: {err}"));
        }
        dir.write(relative, contents)
            .unwrap_or_else(|err| panic!("write {relative}: {err}"));
        self.root.join(relative)
    }
}

#[fixture]
fn config_dir() -> ConfigDir {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
        .unwrap_or_else(|path| panic!("utf8 temp path: {}", path.display()));
    ConfigDir { _tmp: tmp, root }
}

fn load(path: Utf8PathBuf) -> Result<ServiceConfig, ConfigError> {
    ServiceConfig::load(&ConfigSource::explicit(path))
}

#[rstest]
fn gcp_configuration_composes_requests(config_dir: ConfigDir) {
    let path = config_dir.write(
        "etc/orca/config",
        r#"
platform = "gcp"

[gcp]
bucket = "orca-images"
project_id = "orca-project"
zone = "europe-west4-a"

[flags]
nightly = true
envs = ["REGION=eu"]
"#,
    );

    let service = load(path).unwrap_or_else(|err| panic!("load: {err}"));
    let factory = ConfigFactory::new(&service).unwrap_or_else(|err| panic!("factory: {err}"));
    let config = factory.new_config("amy-app-1");

    assert!(matches!(factory.platform(), Platform::Gcp(_)));
    assert_eq!(config.cloud_config.platform, "gcp");
    assert_eq!(config.cloud_config.bucket_name, "orca-images");
    assert_eq!(config.cloud_config.project_id, "orca-project");
    assert_eq!(config.cloud_config.zone, "europe-west4-a");
    assert!(config.nightly);
    assert_eq!(config.env.get("REGION").map(String::as_str), Some("eu"));
}

#[rstest]
fn aws_configuration_seeds_only_target(config_dir: ConfigDir) {
    let path = config_dir.write("config", "platform = \"aws\"\n");

    let service = load(path).unwrap_or_else(|err| panic!("load: {err}"));
    let factory = ConfigFactory::new(&service).unwrap_or_else(|err| panic!("factory: {err}"));
    let config = factory.new_config("amy-app-1");

    assert_eq!(factory.platform(), &Platform::Aws);
    assert_eq!(config.cloud_config.platform, "aws");
    assert!(config.cloud_config.bucket_name.is_empty());
    assert!(config.cloud_config.project_id.is_empty());
}

#[rstest]
fn first_existing_location_wins(config_dir: ConfigDir) {
    let user = config_dir.write("home/.config/orca/config", "platform = \"aws\"\n");
    let cwd = config_dir.write("cwd/config", "platform = \"gcp\"\n");
    let source = ConfigSource::with_candidates(vec![
        config_dir.root.join("etc/orca/config"),
        user,
        cwd,
    ]);

    let service = ServiceConfig::load(&source).unwrap_or_else(|err| panic!("load: {err}"));
    assert_eq!(service.platform, "aws");
}

#[rstest]
#[case("platform = \"azure\"\n", ConfigError::UnsupportedPlatform(String::from("azure")))]
#[case("platform = \"digitalocean\"\n", ConfigError::UnknownPlatform(String::from("digitalocean")))]
#[case("[gcp]\nbucket = \"b\"\n", ConfigError::MissingPlatform)]
fn unusable_platforms_are_fatal(
    config_dir: ConfigDir,
    #[case] contents: &str,
    #[case] expected: ConfigError,
) {
    let path = config_dir.write("config", contents);

    let service = load(path).unwrap_or_else(|err| panic!("load: {err}"));
    assert_eq!(ConfigFactory::new(&service).err(), Some(expected));
}

#[rstest]
fn missing_file_is_fatal(config_dir: ConfigDir) {
    let err = load(config_dir.root.join("absent/config")).expect_err("missing file");
    assert!(matches!(err, ConfigError::NotFound { .. }), "unexpected: {err:?}");
}

#[rstest]
fn unparsable_file_is_fatal(config_dir: ConfigDir) {
    let path = config_dir.write("config", "platform = [\n");

    let err = load(path).expect_err("invalid TOML");
    assert!(matches!(err, ConfigError::Parse { .. }), "unexpected: {err:?}");
}

#[rstest]
fn mistyped_flag_override_is_fatal(config_dir: ConfigDir) {
    let path = config_dir.write("config", "platform = \"aws\"\n[flags]\nnightly = \"yes\"\n");

    let service = load(path).unwrap_or_else(|err| panic!("load: {err}"));
    let err = ConfigFactory::new(&service).expect_err("text for a bool flag");
    assert!(matches!(err, ConfigError::Flag(_)), "unexpected: {err:?}");
}
