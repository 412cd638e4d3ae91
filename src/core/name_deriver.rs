use tracing::warn;

/// C2: derives a safe local output filename from the control document's
/// advisory filename and the source the control document came from (spec
/// §4.2). Grounded in `original_source/client.c`'s `get_filename` /
/// `get_filename_prefix`.
pub struct NameDeriver;

impl NameDeriver {
    /// Longest leading alphanumeric run of the file component of `path`.
    fn prefix_of(source_name: &str) -> String {
        let file_component = source_name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(source_name);
        file_component
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect()
    }

    pub fn derive(advisory: Option<&str>, source_name: &str) -> String {
        if let Some(adv) = advisory {
            if adv.contains('/') || adv.contains('\\') {
                warn!(advisory = adv, "rejected advised filename: contains a path separator");
            } else {
                let prefix = Self::prefix_of(source_name);
                if !prefix.is_empty() && adv.starts_with(&prefix) {
                    return adv.to_string();
                }
                warn!(
                    advisory = adv,
                    prefix = prefix.as_str(),
                    "rejected advised filename: prefix mismatch with source name"
                );
            }
        }

        let prefix = Self::prefix_of(source_name);
        if !prefix.is_empty() {
            prefix
        } else {
            "zsync-download".to_string()
        }
    }
}
