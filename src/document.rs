//! Program record types shared between ingestion, storage, and retrieval.

use serde::{Deserialize, Serialize};

/// A stored assistance-program record.
///
/// `id` is a stable slug derived from the canonical source URL (or the title
/// when no URL exists), so re-ingesting the same page overwrites rather than
/// duplicates. `text` is the canonical embeddable body; a record without one
/// is never persisted with an embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramRecord {
    /// Stable unique key.
    pub id: String,
    /// Page title.
    pub title: Option<String>,
    /// Program name as scraped from the source.
    pub program_name: Option<String>,
    /// Structured overview text, when the source page had one.
    pub program_overview: Option<String>,
    /// Link found inside the overview section.
    pub overview_link: Option<String>,
    /// Canonical embeddable body.
    pub text: Option<String>,
    /// Model embedding vector, uniform length within a table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// Raw fields captured for one program page before canonicalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScrapedProgram {
    /// Canonical source URL.
    pub source_url: Option<String>,
    /// Page title.
    pub title: Option<String>,
    /// Program name.
    pub program_name: Option<String>,
    /// Overview section body.
    pub program_overview: Option<String>,
    /// Link found inside the overview section.
    pub overview_link: Option<String>,
    /// How-to-apply section.
    pub to_apply: Option<String>,
    /// Other-requirements section.
    pub requirements: Option<String>,
    /// Contact section.
    pub contact: Option<String>,
}

impl ScrapedProgram {
    /// Selects the canonical embeddable body by priority: structured overview
    /// text, then the overview-link URL, then a concatenation of the
    /// auxiliary sections. Returns `None` when nothing usable exists.
    pub fn canonical_text(&self) -> Option<String> {
        if let Some(overview) = non_blank(&self.program_overview) {
            return Some(overview.to_string());
        }
        if let Some(link) = non_blank(&self.overview_link) {
            return Some(link.to_string());
        }
        let auxiliary: Vec<&str> = [&self.to_apply, &self.requirements, &self.contact]
            .into_iter()
            .filter_map(non_blank)
            .collect();
        if auxiliary.is_empty() {
            None
        } else {
            Some(auxiliary.join("\n\n"))
        }
    }

    /// Derives the stable record id from the canonical URL, falling back to
    /// the title. Re-running ingestion over unchanged input yields the same
    /// key.
    pub fn record_id(&self) -> Option<String> {
        if let Some(url) = non_blank(&self.source_url) {
            return Some(slugify(url));
        }
        non_blank(&self.title).map(slugify)
    }

    /// Converts the scraped fields into the persisted record shape, without
    /// an embedding. Returns `None` when no stable id can be derived.
    pub fn into_record(self) -> Option<ProgramRecord> {
        let id = self.record_id()?;
        let text = self.canonical_text();
        Some(ProgramRecord {
            id,
            title: self.title,
            program_name: self.program_name,
            program_overview: self.program_overview,
            overview_link: self.overview_link,
            text,
            embedding: None,
        })
    }
}

fn non_blank(field: &Option<String>) -> Option<&str> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Lowercases and collapses a source identifier into a URL-safe slug. Scheme
/// prefixes are stripped so `http` and `https` variants of a page collide.
pub fn slugify(input: &str) -> String {
    let stripped = input
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/');
    let mut slug = String::with_capacity(stripped.len());
    let mut last_dash = true;
    for ch in stripped.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scraped() -> ScrapedProgram {
        ScrapedProgram {
            source_url: Some(
                "https://www.rd.usda.gov/programs-services/business-programs/rcdg/al".to_string(),
            ),
            title: Some("Rural Cooperative Development Grant".to_string()),
            program_name: Some("RCDG".to_string()),
            ..ScrapedProgram::default()
        }
    }

    #[test]
    fn canonical_text_prefers_overview() {
        let mut page = scraped();
        page.program_overview = Some("Grants for cooperative development.".to_string());
        page.overview_link = Some("https://example.gov/details".to_string());
        page.to_apply = Some("Apply at your state office.".to_string());
        assert_eq!(
            page.canonical_text().as_deref(),
            Some("Grants for cooperative development.")
        );
    }

    #[test]
    fn canonical_text_falls_back_to_link_then_auxiliary() {
        let mut page = scraped();
        page.overview_link = Some("https://example.gov/details".to_string());
        assert_eq!(
            page.canonical_text().as_deref(),
            Some("https://example.gov/details")
        );

        page.overview_link = None;
        page.to_apply = Some("Apply at your state office.".to_string());
        page.contact = Some("Call 555-0100.".to_string());
        assert_eq!(
            page.canonical_text().as_deref(),
            Some("Apply at your state office.\n\nCall 555-0100.")
        );
    }

    #[test]
    fn no_text_means_none() {
        let page = scraped();
        assert!(page.canonical_text().is_none());
    }

    #[test]
    fn scraped_page_round_trips_a_jsonl_line() {
        let line = r#"{"source_url":"https://example.gov/p","title":"Program P"}"#;
        let page: ScrapedProgram = serde_json::from_str(line).unwrap();
        assert_eq!(page.title.as_deref(), Some("Program P"));

        // Malformed lines surface as ordinary serde errors the loader can
        // skip one at a time.
        assert!(serde_json::from_str::<ScrapedProgram>("{not json").is_err());
        assert!(serde_json::from_str::<ScrapedProgram>(r#"{"title":7}"#).is_err());
    }

    #[test]
    fn record_id_is_stable_across_reingestion() {
        let first = scraped().record_id().unwrap();
        let second = scraped().record_id().unwrap();
        assert_eq!(first, second);
        assert_eq!(
            first,
            "www-rd-usda-gov-programs-services-business-programs-rcdg-al"
        );
    }

    #[test]
    fn record_id_ignores_scheme_and_trailing_slash() {
        assert_eq!(
            slugify("http://example.gov/a/b/"),
            slugify("https://example.gov/a/b")
        );
    }

    #[test]
    fn record_id_falls_back_to_title() {
        let mut page = scraped();
        page.source_url = None;
        assert_eq!(
            page.record_id().as_deref(),
            Some("rural-cooperative-development-grant")
        );
    }
}
