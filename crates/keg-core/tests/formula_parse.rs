use keg_core::{Formula, KegError, MatchKind};

const CQ_PARSER: &str = r#"
name = "cq-parser"
description = "Lexer and parser for the CQ programming language"
homepage = "https://example.com/cq-parser"
version = "1.0.0"
url = "https://example.com/cq-parser-1.0.0.zip"
dependencies = ["flex", "bison"]

[digest]
algorithm = "sha256"
value = "29c35b1ca079ecf61ebf3d4627031353ca7f47bc0974a48f9905afe54612af0f"

[[build]]
argv = ["make"]

[[install]]
source = "cq_parser"
dest = "bin/cq_parser"

[[test]]
argv = ["bin/cq_parser", "--version"]
expect = "1.0.0"

[[test]]
argv = ["make", "test"]
"#;

#[test]
fn full_formula_parses() {
    let formula = Formula::from_toml(CQ_PARSER).expect("parse");
    assert_eq!(formula.name, "cq-parser");
    assert_eq!(formula.version, "1.0.0");
    assert_eq!(formula.dependencies, vec!["flex", "bison"]);
    assert_eq!(formula.build.len(), 1);
    assert_eq!(formula.install[0].dest, "bin/cq_parser");
    assert_eq!(formula.test[0].expect.as_deref(), Some("1.0.0"));
    assert_eq!(formula.test[0].match_kind, MatchKind::Contains);
    assert!(formula.test[1].expect.is_none());
}

#[test]
fn missing_url_is_malformed() {
    let toml = r#"
name = "broken"
version = "0.1.0"

[digest]
algorithm = "sha256"
value = "29c35b1ca079ecf61ebf3d4627031353ca7f47bc0974a48f9905afe54612af0f"
"#;
    let err = Formula::from_toml(toml).expect_err("must fail");
    assert!(matches!(err, KegError::MalformedFormula(_)));
}

#[test]
fn bad_digest_value_is_malformed() {
    let toml = r#"
name = "broken"
version = "0.1.0"
url = "https://example.com/a.zip"

[digest]
algorithm = "sha256"
value = "nothex"
"#;
    let err = Formula::from_toml(toml).expect_err("must fail");
    assert!(matches!(err, KegError::MalformedFormula(_)));
    assert_eq!(err.info().code, "keg_core.digest_value");
}

#[test]
fn self_dependency_is_malformed() {
    let toml = r#"
name = "ouroboros"
version = "0.1.0"
url = "https://example.com/a.zip"
dependencies = ["ouroboros"]

[digest]
algorithm = "sha256"
value = "29c35b1ca079ecf61ebf3d4627031353ca7f47bc0974a48f9905afe54612af0f"
"#;
    let err = Formula::from_toml(toml).expect_err("must fail");
    assert_eq!(err.info().code, "keg_core.formula_self_dep");
}

#[test]
fn escaping_install_dest_is_malformed() {
    let toml = r#"
name = "escapee"
version = "0.1.0"
url = "https://example.com/a.zip"

[digest]
algorithm = "sha256"
value = "29c35b1ca079ecf61ebf3d4627031353ca7f47bc0974a48f9905afe54612af0f"

[[install]]
source = "out"
dest = "../outside"
"#;
    let err = Formula::from_toml(toml).expect_err("must fail");
    assert_eq!(err.info().code, "keg_core.formula_install_dest");
}
