use super::*;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn defaults_match_documented_values() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
    assert_eq!(settings.server.graceful_shutdown, Duration::from_secs(30));
    assert_eq!(settings.site.public_dir, "www");
    assert_eq!(settings.site.error_dir, "error");
    assert_eq!(settings.site.template_ext, "tera");
    assert_eq!(settings.site.index_name, "index");
    assert!(settings.site.root.ends_with('/'));
    assert_eq!(settings.cache.path_cache_limit.get(), 100);
    assert!(!settings.cache.uncache_modified);
    assert!(settings.deploy.secret.is_none());
    assert_eq!(settings.deploy.webhook_path, "/_deploy");
    assert_eq!(settings.deploy.branch, "master");
    assert_eq!(settings.deploy.api_base, "https://api.github.com");
    assert_eq!(settings.deploy.update_command, vec!["cargo", "update"]);
    assert_eq!(settings.deploy.script_target, "es2015");
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn site_root_gets_trailing_slash_and_forward_separators() {
    let mut raw = RawSettings::default();
    raw.site.base_path = Some(PathBuf::from("C:\\sites\\blog"));
    raw.site.public_dir = Some("/public/".to_string());
    raw.site.template_ext = Some(".tpl".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.site.root, "C:/sites/blog/");
    assert_eq!(settings.site.public_dir, "public");
    assert_eq!(settings.site.template_ext, "tpl");
}

#[test]
fn zero_path_cache_limit_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.path_cache_limit = Some(0);

    let err = Settings::from_raw(raw).expect_err("limit must be positive");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.path_cache_limit",
            ..
        }
    ));
}

#[test]
fn blank_secret_counts_as_unset() {
    let mut raw = RawSettings::default();
    raw.deploy.secret = Some("   ".to_string());
    raw.deploy.token = Some(" abc ".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(settings.deploy.secret.is_none());
    assert_eq!(settings.deploy.token.as_deref(), Some("abc"));
}

#[test]
fn webhook_path_must_be_absolute() {
    let mut raw = RawSettings::default();
    raw.deploy.webhook_path = Some("hook".to_string());

    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn api_base_must_parse_and_loses_trailing_slash() {
    let mut raw = RawSettings::default();
    raw.deploy.api_base = Some("http://127.0.0.1:9000/".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.deploy.api_base, "http://127.0.0.1:9000");

    let mut raw = RawSettings::default();
    raw.deploy.api_base = Some("not a url".to_string());
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn empty_update_command_is_rejected() {
    let mut raw = RawSettings::default();
    raw.deploy.update_command = Some(Vec::new());

    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn script_target_must_name_a_known_engine() {
    let mut raw = RawSettings::default();
    raw.deploy.script_target = Some("netscape4".to_string());
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "deploy.script_target",
            ..
        })
    ));

    let mut raw = RawSettings::default();
    raw.deploy.script_target = Some("es2017,chrome80".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.deploy.script_target, "es2017,chrome80");
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["pressbox"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_resolve_arguments() {
    let args = CliArgs::parse_from([
        "pressbox",
        "resolve",
        "--site-base-path",
        "/srv/site",
        "/blog/",
    ]);

    match args.command.expect("resolve command") {
        Command::Resolve(resolve) => {
            assert_eq!(resolve.path, "/blog/");
            assert_eq!(
                resolve.site.base_path.as_deref(),
                Some(std::path::Path::new("/srv/site"))
            );
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn parse_serve_deploy_overrides() {
    let args = CliArgs::parse_from([
        "pressbox",
        "serve",
        "--deploy-branch",
        "main",
        "--cache-uncache-modified",
        "true",
    ]);

    let mut raw = RawSettings::default();
    match args.command.expect("serve command") {
        Command::Serve(serve) => raw.apply_serve_overrides(&serve.overrides),
        other => panic!("unexpected command: {other:?}"),
    }
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.deploy.branch, "main");
    assert!(settings.cache.uncache_modified);
}
