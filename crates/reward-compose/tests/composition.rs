use reward_compose::{
    compose_args, render_fragments, select_environment, select_services, write_traefik_config,
    ComposeError, ScratchRegistry, TemplateSources,
};
use reward_config::{ConfigLoader, ConfigSnapshot, EnvType, HostOs, Platform};
use std::fs;
use std::path::Path;
use strum::IntoEnumIterator;

fn load(root: &Path, env: &str, os: HostOs) -> ConfigSnapshot {
    fs::create_dir_all(root.join("project")).unwrap();
    fs::create_dir_all(root.join("home")).unwrap();
    fs::write(root.join("project/.env"), env).unwrap();
    ConfigLoader::new(root.join("project"))
        .user_home(root.join("home"))
        .env_vars(Vec::<(String, String)>::new())
        .platform(Platform::new(os, "amd64", false))
        .load()
        .unwrap()
}

fn env_file(env_type: EnvType) -> String {
    format!(
        "REWARD_ENV_NAME=shop\nREWARD_ENV_TYPE={}\nREWARD_WEB_ROOT=/\n",
        env_type.as_str()
    )
}

fn services(doc: &serde_yaml::Value) -> Vec<String> {
    doc.get("services")
        .and_then(serde_yaml::Value::as_mapping)
        .map(|m| {
            m.keys()
                .filter_map(|k| k.as_str().map(str::to_owned))
                .collect()
        })
        .unwrap_or_default()
}

#[test]
fn every_type_renders_on_every_os() {
    for env_type in EnvType::iter() {
        for os in [HostOs::Linux, HostOs::Darwin, HostOs::Windows] {
            let dir = tempfile::tempdir().unwrap();
            let cfg = load(dir.path(), &env_file(env_type), os);
            let set = select_environment(&cfg, &TemplateSources::for_snapshot(&cfg)).unwrap();
            let composition = render_fragments(&set, &cfg)
                .unwrap_or_else(|e| panic!("{env_type} on {os:?}: {e}"));
            assert!(
                !composition.is_empty(),
                "{env_type} on {os:?} rendered nothing"
            );
        }
    }
}

#[test]
fn selection_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = load(dir.path(), &env_file(EnvType::Magento2), HostOs::Linux);
    let sources = TemplateSources::for_snapshot(&cfg);
    let first: Vec<String> = select_environment(&cfg, &sources)
        .unwrap()
        .names()
        .into_iter()
        .map(str::to_owned)
        .collect();
    for _ in 0..5 {
        let again = select_environment(&cfg, &sources).unwrap();
        assert_eq!(again.names(), first);
    }
}

#[test]
fn magento2_composition_carries_environment_labels() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = load(dir.path(), &env_file(EnvType::Magento2), HostOs::Linux);
    let set = select_environment(&cfg, &TemplateSources::for_snapshot(&cfg)).unwrap();
    let composition = render_fragments(&set, &cfg).unwrap();

    let all: Vec<String> = composition
        .fragments()
        .iter()
        .flat_map(|f| services(&f.document))
        .collect();
    for svc in ["php-fpm", "php-debug", "nginx", "db", "redis"] {
        assert!(all.iter().any(|s| s == svc), "missing {svc} in {all:?}");
    }

    let networks = &composition.fragments()[0];
    assert!(networks.name.ends_with("includes/networks.base.yml"));
    let yaml = networks.to_yaml().unwrap();
    assert!(yaml.contains("dev.reward.environment.name=shop"), "{yaml}");
}

#[test]
fn project_override_is_used_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = load(dir.path(), &env_file(EnvType::Magento2), HostOs::Linux);
    let override_path = cfg
        .local_dir()
        .join("templates/docker-compose/environments/includes/db.base.yml");
    fs::create_dir_all(override_path.parent().unwrap()).unwrap();
    fs::write(
        &override_path,
        "services:\n  db:\n    image: custom/db:{{ reward_env_name }}\n",
    )
    .unwrap();

    let set = select_environment(&cfg, &TemplateSources::for_snapshot(&cfg)).unwrap();
    let composition = render_fragments(&set, &cfg).unwrap();
    let db = composition
        .fragments()
        .iter()
        .find(|f| f.name.ends_with("includes/db.base.yml"))
        .unwrap();
    assert_eq!(db.document["services"]["db"]["image"], "custom/db:shop");
}

#[test]
fn broken_override_fails_with_fragment_name() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = load(dir.path(), &env_file(EnvType::Laravel), HostOs::Linux);
    fs::create_dir_all(cfg.local_dir()).unwrap();
    fs::write(cfg.local_dir().join("reward-env.yml"), "{% if %}").unwrap();

    let set = select_environment(&cfg, &TemplateSources::for_snapshot(&cfg)).unwrap();
    match render_fragments(&set, &cfg).unwrap_err() {
        ComposeError::TemplateParse { name, .. } => assert_eq!(name, "reward-env.yml"),
        other => panic!("unexpected: {other}"),
    }
}

#[test]
fn composer_arguments_reference_scratch_files() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = load(dir.path(), &env_file(EnvType::Symfony), HostOs::Linux);
    let set = select_environment(&cfg, &TemplateSources::for_snapshot(&cfg)).unwrap();
    let composition = render_fragments(&set, &cfg).unwrap();
    let registry = ScratchRegistry::new();

    let args = compose_args(
        &registry,
        &composition,
        cfg.cwd(),
        "shop",
        &["up".to_owned(), "--detach".to_owned()],
    )
    .unwrap();

    let files = registry.paths();
    assert_eq!(files.len(), composition.len());
    assert_eq!(args.len(), files.len() * 2 + 6);
    for (i, file) in files.iter().enumerate() {
        assert_eq!(args[i * 2], "-f");
        assert_eq!(args[i * 2 + 1], file.display().to_string());
        let written: serde_yaml::Value =
            serde_yaml::from_str(&fs::read_to_string(file).unwrap()).unwrap();
        assert_eq!(written, composition.fragments()[i].document);
    }
    let tail = &args[files.len() * 2..];
    assert_eq!(
        tail,
        [
            "--project-directory".to_owned(),
            cfg.cwd().display().to_string(),
            "--project-name".to_owned(),
            "shop".to_owned(),
            "up".to_owned(),
            "--detach".to_owned(),
        ]
    );

    registry.cleanup().unwrap();
    assert!(files.iter().all(|f| !f.exists()));
}

#[test]
fn global_services_render_with_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = load(dir.path(), "", HostOs::Linux);
    let set = select_services(&TemplateSources::for_snapshot(&cfg)).unwrap();
    let composition = render_fragments(&set, &cfg).unwrap();
    let names = services(&composition.fragments()[0].document);
    assert!(names.iter().any(|s| s == "traefik"));
    assert!(names.iter().any(|s| s == "mailhog"));
    assert!(!names.iter().any(|s| s == "adminer"));
}

#[test]
fn proxy_binds_additional_ports() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("home")).unwrap();
    fs::write(
        dir.path().join("home/.reward.yml"),
        "reward_traefik_bind_additional_http_ports: [8080]\n\
         reward_traefik_bind_additional_https_ports: [8443, 9443]\n",
    )
    .unwrap();
    let cfg = load(dir.path(), "", HostOs::Linux);

    let set = select_services(&TemplateSources::for_snapshot(&cfg)).unwrap();
    let composition = render_fragments(&set, &cfg).unwrap();
    let ports: Vec<&str> = composition.fragments()[0].document["services"]["traefik"]["ports"]
        .as_sequence()
        .unwrap()
        .iter()
        .filter_map(serde_yaml::Value::as_str)
        .collect();
    assert_eq!(
        ports,
        [
            "127.0.0.1:80:80",
            "127.0.0.1:443:443",
            "127.0.0.1:8080:8080",
            "127.0.0.1:8443:8443",
            "127.0.0.1:9443:9443",
        ]
    );

    let files = write_traefik_config(&cfg).unwrap();
    let doc: serde_yaml::Value =
        serde_yaml::from_str(&fs::read_to_string(files.static_config).unwrap()).unwrap();
    let entry_points = &doc["entryPoints"];
    assert_eq!(entry_points["http-additional-8080"]["address"].as_str(), Some(":8080"));
    assert_eq!(entry_points["https-additional-8443"]["address"].as_str(), Some(":8443"));
    assert_eq!(entry_points["https-additional-9443"]["address"].as_str(), Some(":9443"));
    assert_eq!(entry_points["https"]["address"].as_str(), Some(":443"));
}
