use bom_linkage::config::RunConfig;
use bom_linkage::pipeline::{run, PipelineOptions};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const AUTHORITY: &str = "\
Canonical DBN Name,Omeka Parish Name,Variant Names,Bills Subunit
St Olave Hart Street,St Olave Hartstreet,\"St Olave, S Olave Hart Street\",97 parishes within the walls
Allhallows Barking,Alhallows Barking,All Hallows Barking,97 parishes within the walls
";

const LAXTON_PARISHES: &str = "\
Unique ID,Year,Week,Start Day,Start Month,End Day,End Month,St Olave Hartstreet - Buried,St Olave Hartstreet - Plague,Alhallows Barking - Buried,Parishes within the walls - Buried,is_illegible_alhallows_barking_buried
L-1665-33,1665,33,8,August,15,August,12,3,,140,y
L-1665-34,1665,34,15,August,22,August,14,5,9,150,
";

const WELLCOME_PARISHES: &str = "\
Year,Week,Start Day,Start Month,End Day,End Month,St Olave Hart Street Buried
1665,33,8,August,14,August,13
1700,2,1,January,7,January,4
";

const GENERAL_BILLS: &str = "\
Year,Unique Identifier,St Olave Hart Street,Christened in the 97 Parishes within the Walls,Buried in the 97 Parishes within the Walls
1665,GeneralBill-1665,237,1200,15207
";

const LAXTON_CAUSES: &str = "\
Year,Week,Start Day,Start Month,End Day,End Month,Plague,Flox and Small Pox,Buried Male
1665,33,8,August,15,August,2880,3,10
";

const BROKEN: &str = "\
Week,St Olave Buried
1,2
";

const DICTIONARY: &str = "\
Cause,Definition,Source
Flox and Small Pox,Smallpox,Glossary of the bills
";

const RUN_CONFIG: &str = "\
description: fixture run
authority: authority.csv
dictionary: dictionary.csv
sources:
  - path: laxton_parishes.csv
  - path: wellcome_parishes.csv
    source_name: wellcome_parishes
    period_mode: link
  - path: general_bills.csv
    kind: general
  - path: laxton_causes.csv
  - path: broken_parishes.csv
  - path: missing_*.csv
";

fn write_fixtures(dir: &Path) {
    for (name, content) in [
        ("authority.csv", AUTHORITY),
        ("laxton_parishes.csv", LAXTON_PARISHES),
        ("wellcome_parishes.csv", WELLCOME_PARISHES),
        ("general_bills.csv", GENERAL_BILLS),
        ("laxton_causes.csv", LAXTON_CAUSES),
        ("broken_parishes.csv", BROKEN),
        ("dictionary.csv", DICTIONARY),
        ("run.yaml", RUN_CONFIG),
    ] {
        fs::write(dir.join(name), content).unwrap();
    }
}

fn read_rows(path: &Path) -> Vec<csv::StringRecord> {
    csv::Reader::from_path(path).unwrap().records().map(Result::unwrap).collect()
}

fn run_fixture() -> (TempDir, bom_linkage::pipeline::RunSummary) {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path());
    let config = RunConfig::load(&dir.path().join("run.yaml")).unwrap();
    let summary = run(&config, &PipelineOptions::new(dir.path().join("out"))).unwrap();
    (dir, summary)
}

#[test]
fn links_sources_into_shared_entities() {
    let (dir, summary) = run_fixture();
    let out = dir.path().join("out");

    assert_eq!(summary.tables_loaded, 5);
    assert_eq!(summary.parishes, 4);
    assert_eq!(summary.periods, 3);
    assert_eq!(summary.years, 1);
    assert_eq!(summary.observations, 14);
    assert_eq!(summary.rows_written["observations"], 14);

    let parishes = read_rows(&out.join("parishes.csv"));
    let olave_ids: Vec<&str> = parishes.iter()
        .filter(|r| &r[2] == "St Olave Hart Street")
        .map(|r| &r[0])
        .collect();
    assert_eq!(olave_ids.len(), 3);
    assert!(olave_ids.iter().all(|id| *id == olave_ids[0]));
    assert!(parishes.iter().any(|r| &r[1] == "Alhallows Barking" && &r[2] == "Allhallows Barking"));

    let periods = read_rows(&out.join("periods.csv"));
    let annual: Vec<_> = periods.iter().filter(|r| &r[10] == "annual").collect();
    assert_eq!(annual.len(), 1);
    assert_eq!(&annual[0][0], "1664121716651216");
    assert_eq!(&annual[0][8], "1665-1665-90");
}

#[test]
fn keeps_every_source_reading_with_provenance() {
    let (dir, summary) = run_fixture();
    let observations = read_rows(&dir.path().join("out").join("observations.csv"));

    let week_33_olave: Vec<_> = observations.iter()
        .filter(|r| &r[1] == "parish" && &r[5] == "buried" && &r[8] == "1665080816650815" && r[16].contains("olave"))
        .collect();
    assert_eq!(week_33_olave.len(), 2);
    let readings: Vec<(&str, &str, &str)> = week_33_olave.iter().map(|r| (&r[14], &r[6], &r[13])).collect();
    assert!(readings.contains(&("laxton_parishes", "12", "exact")));
    assert!(readings.contains(&("wellcome_parishes", "13", "end_day_shift")));

    let missing: Vec<_> = observations.iter().filter(|r| &r[10] == "true").collect();
    assert_eq!(missing.len(), 1);
    assert_eq!(&missing[0][6], "0");
    assert_eq!(&missing[0][12], "illegible");

    let audit = &summary.audit;
    assert_eq!(audit.sources_processed, 4);
    assert_eq!(audit.sources_skipped.len(), 1);
    assert_eq!(audit.sources_skipped[0].source_name, "parishes_unknown");
    assert_eq!(audit.fallback.end_day_shift, 1);
    assert_eq!(audit.unresolved_periods, 1);
    assert_eq!(audit.records_dropped_unresolved, 1);
    assert!(audit.unmapped_parishes.is_empty());
    assert_eq!(audit.reconciliation.cross_source_groups, 1);
    assert_eq!(audit.reconciliation.cross_source_disagreements, 1);
    assert_eq!(audit.reconciliation.same_source_duplicates_removed, 0);
}

#[test]
fn writes_causes_and_audit() {
    let (dir, _) = run_fixture();
    let out = dir.path().join("out");

    let causes = read_rows(&out.join("causes.csv"));
    assert_eq!(causes.len(), 2);
    assert_eq!(&causes[0][0], "flox and small pox");
    assert_eq!(&causes[0][1], "Smallpox");
    assert_eq!(&causes[1][0], "plague");
    assert_eq!(&causes[1][1], "");

    let audit: serde_json::Value = serde_json::from_str(&fs::read_to_string(out.join("audit.json")).unwrap()).unwrap();
    assert_eq!(audit["description"], "fixture run");
    assert_eq!(audit["records_extracted"], 14);
    assert_eq!(audit["rows_written"]["periods"], 3);
    assert_eq!(audit["fallback"]["end_day_shift"], 1);
}

#[test]
fn runs_are_deterministic() {
    let (first, _) = run_fixture();
    let (second, _) = run_fixture();
    for table in ["parishes.csv", "periods.csv", "observations.csv"] {
        let a = fs::read_to_string(first.path().join("out").join(table)).unwrap();
        let b = fs::read_to_string(second.path().join("out").join(table)).unwrap();
        assert_eq!(a, b, "{} differs between runs", table);
    }
}

#[test]
fn fails_only_without_any_usable_input() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("authority.csv"), AUTHORITY).unwrap();
    fs::write(dir.path().join("run.yaml"), "authority: authority.csv\nsources:\n  - path: nothing_here_*.csv\n").unwrap();
    let config = RunConfig::load(&dir.path().join("run.yaml")).unwrap();
    assert!(run(&config, &PipelineOptions::new(dir.path().join("out"))).is_err());
}

#[test]
fn runs_on_without_an_authority_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("laxton_parishes.csv"), LAXTON_PARISHES).unwrap();
    fs::write(dir.path().join("run.yaml"), "authority: no_such_authority.csv\nsources:\n  - path: laxton_parishes.csv\n").unwrap();
    let config = RunConfig::load(&dir.path().join("run.yaml")).unwrap();
    let summary = run(&config, &PipelineOptions::new(dir.path().join("out"))).unwrap();

    assert_eq!(summary.parishes, 2);
    let mut unmapped = summary.audit.unmapped_parishes.clone();
    unmapped.sort();
    assert_eq!(unmapped, vec!["Alhallows Barking".to_string(), "St Olave Hartstreet".to_string()]);
    assert!(summary.rows_written["observations"] > 0);
    let parishes = read_rows(&dir.path().join("out").join("parishes.csv"));
    assert!(parishes.iter().all(|r| r[1] == r[2] && r[3].is_empty()));
}

#[test]
fn fails_when_every_loaded_source_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("authority.csv"), AUTHORITY).unwrap();
    fs::write(dir.path().join("broken_parishes.csv"), BROKEN).unwrap();
    fs::write(dir.path().join("run.yaml"), "authority: authority.csv\nsources:\n  - path: broken_parishes.csv\n").unwrap();
    let config = RunConfig::load(&dir.path().join("run.yaml")).unwrap();
    let err = run(&config, &PipelineOptions::new(dir.path().join("out"))).unwrap_err();
    assert!(err.to_string().contains("skipped"), "{}", err);
    assert!(!dir.path().join("out").join("observations.csv").exists());
}
