use listening_test_prep::test_config::{
    build_config, create_bws_config, create_mushra_config, inject_hidden_reference, to_js,
    write_js_config, TestConfig,
};
use listening_test_prep::{Error, SampleRecord, StudyConfig, TestItem, TestKind};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;
use tempfile::TempDir;

fn item(kind: TestKind, sentence_id: &str, systems: &[&str]) -> TestItem {
    let record = SampleRecord {
        speaker: "ABA".to_string(),
        sentence_id: sentence_id.to_string(),
        text: "hello".to_string(),
    };
    let mut item = TestItem::new(kind, &record);
    for system in systems {
        item.files.insert(
            system.to_string(),
            format!("audio/{system}/ABA/{}-{sentence_id}.wav", kind.tag()),
        );
    }
    item
}

fn parse_js(js: &str) -> serde_json::Value {
    let body = js
        .strip_prefix("var TestConfig = ")
        .and_then(|rest| rest.strip_suffix(';'))
        .expect("JS assignment");
    serde_json::from_str(body).unwrap()
}

#[test]
fn test_mushra_adds_one_hidden_duplicate() {
    let study = StudyConfig::default();
    let mut rng = StdRng::seed_from_u64(777);
    let items = vec![item(TestKind::MushraNat, "0001", &["source", "baseline", "ours"])];

    let config = create_mushra_config(TestKind::MushraNat, items, &study, &mut rng).unwrap();
    let files = &config.testsets[0].files;
    assert_eq!(files.len(), 4);

    let hidden: Vec<&String> = files.keys().filter(|k| k.ends_with("---2")).collect();
    assert_eq!(hidden.len(), 1);
    let original = hidden[0].trim_end_matches("---2");
    assert_eq!(files[hidden[0]], files[original]);

    assert_eq!(config.test_name, "Speech Naturalness Evaluation (MUSHRA)");
    assert_eq!(config.rate_scale_png, "img/scale_natural.png");
    assert_eq!(config.max_tests_per_run, 20);
}

#[test]
fn test_hidden_reference_is_drawn_per_item() {
    let systems = ["source", "baseline", "ours"];
    let mut rng = StdRng::seed_from_u64(11);
    let mut picked = HashSet::new();
    for i in 0..50 {
        let mut test_item = item(TestKind::MushraAct, &format!("{i:04}"), &systems);
        picked.insert(inject_hidden_reference(&mut test_item, &mut rng).unwrap());
    }
    assert!(picked.len() > 1);
    assert!(picked.iter().all(|system| systems.contains(&system.as_str())));
}

#[test]
fn test_hidden_reference_needs_files() {
    let mut empty = item(TestKind::MushraNat, "0001", &[]);
    let mut rng = StdRng::seed_from_u64(0);
    assert!(matches!(
        inject_hidden_reference(&mut empty, &mut rng),
        Err(Error::InvalidInput(_))
    ));
}

#[test]
fn test_bws_counts_and_relabels_systems() {
    let study = StudyConfig::default();
    let items = vec![item(TestKind::BwsSim, "0001", &["Reference", "baseline", "ours"])];

    let config = create_bws_config(TestKind::BwsSim, items, &study).unwrap();
    let test_item = &config.testsets[0];
    assert_eq!(test_item.length, Some(2));
    assert_eq!(test_item.low_text.as_deref(), Some("the 'LEAST' similar'"));
    assert_eq!(test_item.high_text.as_deref(), Some("the 'MOST' similar'"));

    let keys: Vec<&str> = test_item.files.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["Reference", "W", "Z"]);
    assert_eq!(test_item.files["W"], "audio/baseline/ABA/BWSSIM-0001.wav");
}

#[test]
fn test_bws_rejects_unlabeled_system() {
    let study = StudyConfig::default();
    let items = vec![item(TestKind::BwsSim, "0001", &["Reference", "source"])];
    match create_bws_config(TestKind::BwsSim, items, &study) {
        Err(Error::MissingBwsLabel(system)) => assert_eq!(system, "source"),
        other => panic!("expected MissingBwsLabel, got {other:?}"),
    }
}

#[test]
fn test_builders_reject_wrong_test_kind() {
    let study = StudyConfig::default();
    let mut rng = StdRng::seed_from_u64(0);
    assert!(create_mushra_config(TestKind::BwsSim, Vec::new(), &study, &mut rng).is_err());
    assert!(create_bws_config(TestKind::MushraAct, Vec::new(), &study).is_err());
    assert!(matches!(
        "MUSHRAXYZ".parse::<TestKind>(),
        Err(Error::UnknownTestKind(_))
    ));
    assert_eq!("bwssim".parse::<TestKind>().unwrap(), TestKind::BwsSim);
}

#[test]
fn test_mushra_js_matches_beaqle_layout() {
    let study = StudyConfig::default();
    let mut rng = StdRng::seed_from_u64(1);
    let items = vec![item(TestKind::MushraAct, "0001", &["source", "ours"])];
    let config = build_config(TestKind::MushraAct, items, &study, &mut rng).unwrap();
    assert!(matches!(config, TestConfig::Mushra(_)));
    assert_eq!(config.testsets().len(), 1);
    assert_eq!(config.testsets()[0].files.len(), 3);

    let js = to_js(&config).unwrap();
    assert!(js.starts_with("var TestConfig = {\n  \"TestName\""));
    let value = parse_js(&js);
    assert_eq!(value["TestName"], "Speech Accentedness Evaluation (MUSHRA)");
    assert_eq!(value["RateScalePng"], "img/scale_accent.png");
    assert_eq!(value["ShowFileIDs"], false);
    assert_eq!(value["EnableABLoop"], true);
    assert_eq!(value["BeaqleServiceURL"], "/web_service/beaqleJS_Service.php");
    assert_eq!(value["RateMaxValue"], 100);
    assert_eq!(value["AudioRoot"], "");

    let testset = &value["Testsets"][0];
    assert_eq!(testset["TestID"], "MUSHRAACT---0001---ABA");
    assert_eq!(testset["Files"].as_object().unwrap().len(), 3);
    assert!(testset.get("Length").is_none());
    assert!(testset.get("LowText").is_none());
}

#[test]
fn test_bws_js_written_to_disk() {
    let study = StudyConfig::default();
    let mut rng = StdRng::seed_from_u64(1);
    let items = vec![item(
        TestKind::BwsSim,
        "0007",
        &["Reference", "baseline", "ours", "ours_scaling", "ours_control"],
    )];
    let config = build_config(TestKind::BwsSim, items, &study, &mut rng).unwrap();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("BWSSIM.js");
    write_js_config(&config, &path).unwrap();

    let value = parse_js(&std::fs::read_to_string(&path).unwrap());
    assert_eq!(value["TestName"], "Speaker Similarity Evaluation (BWS)");
    assert!(value.get("RateScalePng").is_none());
    let testset = &value["Testsets"][0];
    assert_eq!(testset["Length"], 4);
    let labels: HashSet<&str> = testset["Files"]
        .as_object()
        .unwrap()
        .keys()
        .map(String::as_str)
        .collect();
    assert_eq!(labels, HashSet::from(["Reference", "W", "X", "Y", "Z"]));
}
