// End-to-end loads: files on disk into an on-disk SQLite store

use pombe_loader::db::{
    count_by_kind, find_by_attribute, get_attributes, get_collection, get_events, get_refs,
};
use pombe_loader::{Identity, Kind, Loader, LoaderConfig, Scalar, SqlitePersister};
use std::fs;
use std::path::{Path, PathBuf};

const GENES: &str = r#"{
  "SPAC1002.09c": {
    "systematic_id": "SPAC1002.09c",
    "name": "dld1",
    "product": "dihydrolipoamide dehydrogenase",
    "taxonid": 4896,
    "location": { "chromosome_name": "chromosome_1", "start_pos": 1798347, "end_pos": 1799015, "strand": "reverse" },
    "synonyms": [ { "name": "lpd1", "type": "exact" } ],
    "transcripts": [
      {
        "uniquename": "SPAC1002.09c.1",
        "transcript_type": "mRNA",
        "protein": { "uniquename": "SPAC1002.09c.1:pep", "sequence": "MLRAS" }
      }
    ]
  }
}"#;

const DISEASES: &str = "\
#gene\tsymbol\tmondo\treference
SPAC1002.09c\tdld1\tMONDO:0009002\tPMID:20000
SPAC1002.10c\tabc1\tMONDO:0009002\tPMID:20000
";

const ORTHOLOGUES: &str = "\
SPAC1002.09c\tHGNC:2898
SPAC1002.10c\tNONE
";

fn allele_row(gene: &str, allele: &str, fypo: &str) -> String {
    let mut cols = vec![""; 18];
    cols[1] = gene;
    cols[2] = fypo;
    cols[4] = "overexpression";
    cols[9] = allele;
    cols[11] = "amino_acid_mutation";
    cols[13] = "PECO:0000005";
    cols[17] = "PMID:20000";
    cols.join("\t")
}

fn alleles() -> String {
    [
        "#phenotype annotations".to_string(),
        allele_row("SPAC1002.09c", "dld1-1", "FYPO:0000001"),
        allele_row("SPAC1002.09c", "dld1-2", "FYPO:0000002"),
        allele_row("SPAC1002.10c", "abc1-1", "FYPO:0000001"),
        allele_row("", "orphan-1", "FYPO:0000001"),
    ]
    .join("\n")
}

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

fn only(ids: Vec<Identity>) -> Identity {
    assert_eq!(ids.len(), 1, "expected exactly one match, got {:?}", ids);
    ids[0]
}

#[test]
fn test_full_run_into_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("pombe.db");
    let files = [
        write(dir.path(), "genes.json", GENES),
        write(dir.path(), "phenotype_annotations.phaf", &alleles()),
        write(dir.path(), "disease_association.tsv", DISEASES),
        write(dir.path(), "pombe-human-orthologs.txt", ORTHOLOGUES),
    ];

    let mut loader = Loader::new(SqlitePersister::open(&db_path).unwrap());
    for path in &files {
        loader.load_path(path, None).unwrap();
    }
    let (report, persister) = loader.finish();

    assert!(report.is_success(), "{:?}", report.aborted);
    assert_eq!(report.files.len(), 4);
    assert_eq!(report.files[1].source, "alleles");
    assert_eq!(report.files[1].records_read, 4);
    // The orphan allele had no gene: one diagnostic, row still loaded
    assert_eq!(report.files[1].diagnostics.len(), 1);
    assert_eq!(report.files[1].records_processed, 4);
    drop(persister);

    let db = SqlitePersister::open(&db_path).unwrap();
    let conn = db.connection();
    let counts = count_by_kind(conn).unwrap();

    // Run-scoped vocabularies are shared by every file
    assert_eq!(counts.get("Organism"), Some(&2));
    assert_eq!(counts.get("Publication"), Some(&1));
    assert_eq!(counts.get("PhenotypeTerm"), Some(&2));
    assert_eq!(counts.get("MondoTerm"), Some(&1));
    assert_eq!(counts.get("Allele"), Some(&4));
    assert_eq!(counts.get("PhenotypeAnnotation"), Some(&4));

    // File-scoped genes: one per file that mentions them
    let dld1 = find_by_attribute(conn, Kind::Gene, "primaryIdentifier", "SPAC1002.09c").unwrap();
    assert_eq!(dld1.len(), 4);

    // Gene.alleles written once, in first-seen order
    let allele_file_gene = dld1
        .iter()
        .copied()
        .find(|id| !get_collection(conn, *id, "alleles").unwrap().is_empty())
        .unwrap();
    let members = get_collection(conn, allele_file_gene, "alleles").unwrap();
    assert_eq!(members.len(), 2);
    let first = get_attributes(conn, members[0]).unwrap().unwrap();
    assert_eq!(first.get("symbol"), Some(&Scalar::from("dld1-1")));

    // The orphan allele exists without a gene reference
    let orphan = only(find_by_attribute(conn, Kind::Allele, "symbol", "orphan-1").unwrap());
    assert!(get_refs(conn, orphan).unwrap().get("gene").is_none());

    // One disease collecting both genes
    let disease = only(
        find_by_attribute(conn, Kind::Disease, "identifier", "MONDO:0009002|PMID:20000").unwrap(),
    );
    assert_eq!(get_collection(conn, disease, "genes").unwrap().len(), 2);
    assert_eq!(get_collection(conn, disease, "publications").unwrap().len(), 1);

    // Human homologue attached to the pombe gene of the orthologue file
    let human = only(find_by_attribute(conn, Kind::Gene, "primaryIdentifier", "HGNC:2898").unwrap());
    let human_organism = get_refs(conn, human).unwrap()["organism"];
    let taxon = get_attributes(conn, human_organism).unwrap().unwrap();
    assert_eq!(taxon.get("taxonId"), Some(&Scalar::from("9606")));

    let event_types: Vec<_> = get_events(conn)
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(
        event_types,
        [
            "run_started",
            "file_loaded",
            "file_loaded",
            "file_loaded",
            "file_loaded",
            "run_finished"
        ]
    );
}

#[test]
fn test_fatal_file_stops_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("pombe.db");
    let good = write(dir.path(), "disease_association.tsv", DISEASES);
    let broken = write(dir.path(), "genes.json", "[1, 2");
    let later = write(dir.path(), "phenotype_annotations.phaf", &alleles());

    let mut loader = Loader::new(SqlitePersister::open(&db_path).unwrap());
    loader.load_path(&good, None).unwrap();
    assert!(loader.load_path(&broken, None).is_err());
    assert!(loader.load_path(&later, None).is_err());
    let (report, _) = loader.finish();

    assert!(report.aborted.is_some());
    assert!(report.vocabulary.is_none());
    assert_eq!(report.files.len(), 2);
    assert!(report.files[1].fatal.is_some());

    // The first file was finalized before the failure
    let db = SqlitePersister::open(&db_path).unwrap();
    let conn = db.connection();
    let disease = only(
        find_by_attribute(conn, Kind::Disease, "identifier", "MONDO:0009002|PMID:20000").unwrap(),
    );
    assert_eq!(get_collection(conn, disease, "genes").unwrap().len(), 2);
    assert!(count_by_kind(conn).unwrap().get("Allele").is_none());
}

#[test]
fn test_config_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "phenotype_annotations.phaf", &alleles());
    let config = LoaderConfig::from_json(r#"{ "row_limit": 2 }"#).unwrap();

    let persister = SqlitePersister::in_memory().unwrap();
    let mut loader = Loader::from_config(&config, persister).unwrap();
    let file = loader.load_path(&path, None).unwrap();
    assert_eq!(file.records_read, 2);

    let (report, persister) = loader.finish();
    assert!(report.is_success());
    let counts = count_by_kind(persister.connection()).unwrap();
    assert_eq!(counts.get("Allele"), Some(&2));
}
