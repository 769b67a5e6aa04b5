use figment::{
    providers::{Format, Toml},
    Figment,
};

#[test_log::test]
#[test_log(default_log_filter = "debug")]
fn test_configured_run() {
    let mut config = Figment::new();
    config = config.merge(Toml::file_exact("tests/data/config.toml"));
    let driver: mzspotter::MZSpotter = config.extract().unwrap();
    let prog = driver.main().unwrap();
    assert_eq!(prog.files, 3);
    assert_eq!(prog.spots, 2);
    assert_eq!(prog.gaps, 1);
    assert_eq!(prog.gaps_with_signal, 1);
    assert_eq!(prog.identified, 1);
}

#[test_log::test]
fn test_configured_gcms_run() {
    let config = Figment::new().merge(Toml::file_exact("tests/data/gc_config.toml"));
    let driver: mzspotter::MZSpotter = config.extract().unwrap();
    let prog = driver.main().unwrap();
    assert_eq!(prog.files, 2);
    // the unidentified co-eluting peak sharing the quant mass is cleaned away
    assert_eq!(prog.spots, 1);
    assert_eq!(prog.identified, 1);
    assert_eq!(prog.gaps, 0);
}
