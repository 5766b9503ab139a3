//! Which remote archives the warehouse consumes.

/// Name prefixes of the four datasets loaded downstream: establishments,
/// companies, CNAE activity codes and municipality codes.
pub const DATASET_PREFIXES: &[&str] = &["estabelecimentos", "empresas", "cnae", "municipios"];

/// Returns `true` if `name` belongs to one of the [`DATASET_PREFIXES`].
#[must_use]
pub fn is_relevant(name: &str) -> bool {
    let name = name.to_lowercase();
    DATASET_PREFIXES
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

/// Returns `true` for a relevant `.zip` archive, the only kind of file
/// the downloader expects in a month folder.
#[must_use]
pub fn is_expected_archive(name: &str) -> bool {
    name.to_lowercase().ends_with(".zip") && is_relevant(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_dataset_archives() {
        let listed = ["estabelecimentos1.zip", "readme.txt", "empresas2.zip", "notes.zip"];
        let kept: Vec<&str> = listed
            .into_iter()
            .filter(|name| is_expected_archive(name))
            .collect();
        assert_eq!(kept, vec!["estabelecimentos1.zip", "empresas2.zip"]);
    }

    #[test]
    fn prefix_match_ignores_case() {
        assert!(is_relevant("Estabelecimentos0.zip"));
        assert!(is_relevant("CNAES.zip"));
        assert!(is_relevant("Municipios.zip"));
        assert!(!is_relevant("Socios0.zip"));
        assert!(!is_relevant("Simples.zip"));
    }

    #[test]
    fn relevant_non_zip_is_not_expected() {
        assert!(is_relevant("Empresas0.csv"));
        assert!(!is_expected_archive("Empresas0.csv"));
        assert!(is_expected_archive("EMPRESAS0.ZIP"));
    }
}
