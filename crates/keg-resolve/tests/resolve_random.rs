use keg_core::{Catalog, Digest, DigestAlgorithm, Formula};
use keg_resolve::{resolve, NothingInstalled};
use proptest::prelude::*;

fn formula(name: String, deps: Vec<String>) -> Formula {
    Formula {
        name: name.clone(),
        description: String::new(),
        homepage: String::new(),
        version: "1.0.0".to_string(),
        url: format!("https://example.com/{name}.zip"),
        digest: Digest {
            algorithm: DigestAlgorithm::Sha256,
            value: "ab".repeat(32),
        },
        dependencies: deps,
        build: Vec::new(),
        install: Vec::new(),
        test: Vec::new(),
    }
}

// Edges only point from higher to lower index, so the graph is acyclic by
// construction.
fn random_dag(n: usize, edge_bits: &[bool]) -> Vec<Formula> {
    let mut formulas = Vec::with_capacity(n);
    let mut bit = 0;
    for i in 0..n {
        let mut deps = Vec::new();
        for j in 0..i {
            if *edge_bits.get(bit).unwrap_or(&false) {
                deps.push(format!("f{j}"));
            }
            bit += 1;
        }
        formulas.push(formula(format!("f{i}"), deps));
    }
    formulas
}

proptest! {
    #[test]
    fn random_dags_resolve_topologically(n in 2usize..9, bits in prop::collection::vec(any::<bool>(), 64)) {
        let formulas = random_dag(n, &bits);
        let catalog = Catalog::from_formulas(formulas.clone()).expect("catalog");
        let root = format!("f{}", n - 1);
        let order = resolve(&root, &catalog, &NothingInstalled).expect("resolve");
        let positions: std::collections::BTreeMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(idx, r)| (r.formula.name.as_str(), idx))
            .collect();
        for resolution in &order {
            let dependent = positions[resolution.formula.name.as_str()];
            for dep in &resolution.formula.dependencies {
                let dep_pos = positions.get(dep.as_str()).expect("dep resolved");
                prop_assert!(*dep_pos < dependent, "{dep} must precede {}", resolution.formula.name);
            }
        }
        let again = resolve(&root, &catalog, &NothingInstalled).expect("resolve again");
        let names: Vec<_> = order.iter().map(|r| r.formula.name.clone()).collect();
        let names_again: Vec<_> = again.iter().map(|r| r.formula.name.clone()).collect();
        prop_assert_eq!(names, names_again);
    }
}
