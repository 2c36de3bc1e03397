//! Author affiliation heuristics.
//!
//! Decides, from free-text affiliation strings, whether an author sits at a
//! commercial pharma/biotech entity rather than an academic or government
//! institution, and folds per-author verdicts into one output row per
//! qualifying article.
//!
//! The marker lists below are configuration data: extend them without
//! touching the control flow that applies them.

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::pubmed::PaperRecord;

/// Strong academic/government markers. A phrase containing one of these and
/// no company-suffix marker is never industry, whatever else it contains.
const ACADEMIC_MARKERS: &[&str] = &[
    "university",
    "université",
    "universität",
    "universidad",
    "universiteit",
    "college",
    "institute of technology",
    "polytechnic",
    "school of medicine",
    "medical school",
    "school of public health",
    "graduate school",
    "faculty of",
    "hospital",
    "medical center",
    "medical centre",
    "clinic",
    "academy of sciences",
    "national institutes of health",
    "national institute of",
    "national laboratory",
    "ministry of health",
    "research council",
];

/// Company-suffix markers indicating a commercial entity
const COMPANY_MARKERS: &[&str] = &[
    "inc",
    "ltd",
    "llc",
    "plc",
    "corp",
    "corporation",
    "co.",
    "gmbh",
    "ag",
    "bv",
    "b.v.",
    "s.a.",
    "s.l.",
    "s.r.l.",
    "pharma",
    "pharmaceuticals",
    "biotech",
    "biosciences",
    "therapeutics",
    "diagnostics",
];

/// Generic mail providers: evidence-neutral, neither academic nor corporate
const PUBLIC_EMAIL_PROVIDERS: &[&str] = &[
    "gmail",
    "googlemail",
    "yahoo",
    "hotmail",
    "outlook",
    "live",
    "icloud",
    "aol",
    "protonmail",
    "gmx",
    "mail",
    "qq",
    "163",
    "126",
    "foxmail",
    "yandex",
    "naver",
];

/// Country names stripped from the tail of an extracted company name
const COUNTRY_NAMES: &[&str] = &[
    "usa",
    "united states",
    "uk",
    "united kingdom",
    "germany",
    "france",
    "switzerland",
    "austria",
    "italy",
    "spain",
    "netherlands",
    "belgium",
    "sweden",
    "denmark",
    "norway",
    "finland",
    "ireland",
    "japan",
    "china",
    "india",
    "canada",
    "australia",
    "new zealand",
    "south korea",
    "korea",
    "singapore",
    "israel",
    "brazil",
];

/// Verdict for a single affiliation phrase
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhraseVerdict {
    /// Whether the phrase points at a commercial entity
    pub industry: bool,
    /// Best-guess company name; absent when the phrase qualified on email
    /// evidence alone
    pub company: Option<String>,
}

/// One article's normalized output row.
///
/// Exists if and only if at least one author classified as
/// industry-affiliated; `companies` is non-empty by construction.
#[derive(Debug, Clone, PartialEq)]
pub struct PaperRow {
    /// PubMed identifier
    pub pmid: String,
    /// Article title
    pub title: String,
    /// Publication date, possibly partial
    pub pub_date: String,
    /// Industry-affiliated author names, citation order
    pub authors: Vec<String>,
    /// Company names, deduplicated, first-seen order
    pub companies: Vec<String>,
    /// First email found across author affiliations, if any
    pub email: Option<String>,
}

/// Decide whether an article qualifies and build its output row.
///
/// Pure function over the record: classifying the same record twice yields
/// the same result, and no state is carried across records. Never errors —
/// unparseable affiliation text degrades to non-industry.
pub fn classify(record: &PaperRecord) -> Option<PaperRow> {
    let mut qualifies = false;
    let mut authors: Vec<String> = Vec::new();
    let mut companies: Vec<String> = Vec::new();
    let mut email: Option<String> = None;

    for author in &record.authors {
        let mut author_is_industry = false;
        let mut author_has_company = false;
        let mut first_industry_phrase: Option<&str> = None;

        for affiliation in &author.affiliations {
            // PubMed does not flag the corresponding author; the first
            // email in author order stands in for it.
            if email.is_none() {
                email = extract_email(affiliation);
            }

            for phrase in split_phrases(affiliation) {
                let verdict = classify_phrase(phrase);
                if !verdict.industry {
                    continue;
                }
                author_is_industry = true;
                first_industry_phrase.get_or_insert(phrase);
                if let Some(company) = verdict.company {
                    author_has_company = true;
                    push_unique(&mut companies, company);
                }
            }
        }

        if author_is_industry {
            qualifies = true;
            if !author.name.is_empty() {
                push_unique(&mut authors, author.name.clone());
            }
            // Email-only evidence extracts no name; keep the company set
            // non-empty with the raw phrase text.
            if !author_has_company {
                if let Some(phrase) = first_industry_phrase {
                    push_unique(&mut companies, phrase.trim().to_string());
                }
            }
        }
    }

    if !qualifies {
        return None;
    }

    debug!(
        pmid = %record.pmid,
        authors = authors.len(),
        companies = companies.len(),
        "Industry-affiliated paper"
    );

    Some(PaperRow {
        pmid: record.pmid.clone(),
        title: record.title.clone(),
        pub_date: record.pub_date.clone(),
        authors,
        companies,
        email,
    })
}

/// Classify one institution phrase.
///
/// Academic/government exclusion runs first: an academic marker suppresses
/// the phrase unless a company-suffix marker is also present. A corporate
/// email domain is weak evidence: it classifies the phrase as industry but
/// contributes no company name.
pub fn classify_phrase(phrase: &str) -> PhraseVerdict {
    let lower = phrase.to_lowercase();

    let has_company_marker = find_marker(&lower, COMPANY_MARKERS).is_some();
    let is_academic =
        find_marker(&lower, ACADEMIC_MARKERS).is_some() || has_academic_domain(&lower);

    if is_academic && !has_company_marker {
        return PhraseVerdict::default();
    }

    if has_company_marker {
        let extracted = extract_company(phrase);
        let company = if extracted.is_empty() {
            phrase.trim().to_string()
        } else {
            extracted
        };
        return PhraseVerdict {
            industry: true,
            company: Some(company),
        };
    }

    if let Some(email) = extract_email(&lower) {
        let domain = email.split_once('@').map(|(_, d)| d).unwrap_or("");
        if !is_academic_email_domain(domain) && !is_public_provider(domain) {
            return PhraseVerdict {
                industry: true,
                company: None,
            };
        }
    }

    PhraseVerdict::default()
}

/// Split a raw affiliation string on semicolons into institution phrases.
///
/// Periods are not split points: "Dept. of Biology" must stay one phrase.
fn split_phrases(affiliation: &str) -> impl Iterator<Item = &str> {
    affiliation.split(';').map(str::trim).filter(|p| !p.is_empty())
}

/// Find the first marker occurring in `text` at word boundaries.
///
/// Boundary-aware so "inc" does not match "incubator" and "ag" does not
/// match "agriculture". Markers may span words ("school of medicine") or
/// end in punctuation ("co.", "s.a.").
fn find_marker(text: &str, markers: &[&'static str]) -> Option<&'static str> {
    markers.iter().copied().find(|m| contains_word(text, m))
}

fn contains_word(text: &str, needle: &str) -> bool {
    let mut start = 0;
    while let Some(offset) = text[start..].find(needle) {
        let at = start + offset;
        let end = at + needle.len();
        let before_ok = text[..at]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = text[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
        start = at + 1;
    }
    false
}

/// Whether the text carries an academic/government domain token.
fn has_academic_domain(text: &str) -> bool {
    if text.contains(".ac.") {
        return true;
    }
    [".edu", ".gov"].iter().any(|token| {
        text.match_indices(token).any(|(at, _)| {
            text[at + token.len()..]
                .chars()
                .next()
                .map_or(true, |c| !c.is_alphanumeric())
        })
    })
}

fn is_academic_email_domain(domain: &str) -> bool {
    has_academic_domain(&format!(".{}", domain.trim_start_matches('.')))
        || domain.ends_with(".edu")
        || domain.ends_with(".gov")
        || domain.contains(".ac.")
}

fn is_public_provider(domain: &str) -> bool {
    let label = domain.split('.').next().unwrap_or("");
    PUBLIC_EMAIL_PROVIDERS.contains(&label)
}

/// First email token in the text, if any.
pub fn extract_email(text: &str) -> Option<String> {
    email_regex().find(text).map(|m| m.as_str().to_string())
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[A-Za-z0-9][A-Za-z0-9._%+-]*@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")
            .expect("valid email regex")
    })
}

fn postal_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{4,}(?:-\d+)?\b").expect("valid postal regex"))
}

/// Best-effort company name: the token run before the first comma, cut at
/// the first postal code, with email tokens and trailing country names
/// stripped. May return an empty string; callers fall back to the raw
/// phrase.
fn extract_company(phrase: &str) -> String {
    let head = phrase.split(',').next().unwrap_or("").trim();

    let head = match postal_regex().find(head) {
        Some(m) => head[..m.start()].trim(),
        None => head,
    };

    let mut tokens: Vec<&str> = head
        .split_whitespace()
        .filter(|t| !t.contains('@'))
        .collect();
    strip_trailing_locations(&mut tokens);

    tokens.join(" ")
}

fn strip_trailing_locations(tokens: &mut Vec<&str>) {
    loop {
        let n = tokens.len();
        if n >= 2 {
            let pair = normalize_token(&format!("{} {}", tokens[n - 2], tokens[n - 1]));
            if COUNTRY_NAMES.contains(&pair.as_str()) {
                tokens.truncate(n - 2);
                continue;
            }
        }
        if let Some(tail) = tokens.last() {
            let single = normalize_token(tail);
            if COUNTRY_NAMES.contains(&single.as_str()) {
                tokens.pop();
                continue;
            }
        }
        break;
    }
}

fn normalize_token(token: &str) -> String {
    token
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pubmed::PaperAuthor;

    fn record_with(authors: Vec<PaperAuthor>) -> PaperRecord {
        PaperRecord {
            pmid: "12345".to_string(),
            title: "A study".to_string(),
            pub_date: "2023".to_string(),
            authors,
        }
    }

    fn author(name: &str, affiliations: &[&str]) -> PaperAuthor {
        PaperAuthor {
            name: name.to_string(),
            affiliations: affiliations.iter().map(|s| s.to_string()).collect(),
        }
    }

    // === phrase classification ===

    #[test]
    fn test_academic_marker_without_suffix_is_non_industry() {
        for phrase in [
            "Dept. of Biology, Example University, Cambridge, MA",
            "Harvard Medical School, Boston",
            "School of Medicine, Stanford",
            "Massachusetts General Hospital",
            "National Institutes of Health, Bethesda",
        ] {
            assert!(!classify_phrase(phrase).industry, "misclassified: {phrase}");
        }
    }

    #[test]
    fn test_company_suffix_without_academic_is_industry() {
        for phrase in [
            "Genentech Inc",
            "BigPharma Inc, 10 Main St, Boston, MA 02118, USA",
            "Novartis Pharma AG, Basel, Switzerland",
            "Acme Therapeutics GmbH, Mannheim, Germany",
            "Vertex Pharmaceuticals, Boston",
        ] {
            assert!(classify_phrase(phrase).industry, "misclassified: {phrase}");
        }
    }

    #[test]
    fn test_suffix_marker_beats_academic_exclusion() {
        // Step 2 only suppresses phrases with no company suffix
        let verdict = classify_phrase("University spin-off incubated at BigPharma Inc");
        assert!(verdict.industry);
    }

    #[test]
    fn test_gov_domain_excludes_phrase() {
        let verdict = classify_phrase("Laboratory of Genetics, Bethesda. smith@nih.gov");
        assert!(!verdict.industry);
    }

    #[test]
    fn test_corporate_email_alone_is_industry_without_company_name() {
        let verdict = classify_phrase("jdoe@acmebio.com");
        assert!(verdict.industry);
        assert_eq!(verdict.company, None);
    }

    #[test]
    fn test_public_email_provider_is_neutral() {
        assert!(!classify_phrase("Independent researcher. jdoe@gmail.com").industry);
        assert!(!classify_phrase("someone@yahoo.co.jp").industry);
    }

    #[test]
    fn test_academic_email_domain_is_not_industry_evidence() {
        assert!(!classify_phrase("jdoe@cam.ac.uk").industry);
        assert!(!classify_phrase("jdoe@mit.edu").industry);
    }

    #[test]
    fn test_marker_matching_respects_word_boundaries() {
        // "inc" must not fire inside "incubator", "ag" not inside "agriculture"
        assert!(!classify_phrase("Vaccine Incubator Program, Example University").industry);
        assert!(!classify_phrase("Institute for Agriculture Research Council").industry);
    }

    #[test]
    fn test_empty_phrase_is_non_industry() {
        assert_eq!(classify_phrase(""), PhraseVerdict::default());
        assert_eq!(classify_phrase("   "), PhraseVerdict::default());
    }

    // === company extraction ===

    #[test]
    fn test_extract_company_stops_at_first_comma() {
        let verdict = classify_phrase("BigPharma Inc, 10 Main St, Boston, MA 02118, USA");
        assert_eq!(verdict.company.as_deref(), Some("BigPharma Inc"));
    }

    #[test]
    fn test_extract_company_cuts_postal_code_and_country() {
        let verdict = classify_phrase("Acme Therapeutics GmbH 68159 Mannheim Germany");
        assert_eq!(verdict.company.as_deref(), Some("Acme Therapeutics GmbH"));

        let verdict = classify_phrase("Beta Biosciences Ltd Cambridge United Kingdom");
        assert_eq!(verdict.company.as_deref(), Some("Beta Biosciences Ltd Cambridge"));
    }

    #[test]
    fn test_extract_company_falls_back_to_raw_phrase() {
        // Head collapses to nothing once the email token is dropped
        let verdict = classify_phrase("info@acme.inc, Boston");
        assert!(verdict.industry);
        assert_eq!(verdict.company.as_deref(), Some("info@acme.inc, Boston"));
    }

    // === email extraction ===

    #[test]
    fn test_extract_email_from_affiliation_text() {
        assert_eq!(
            extract_email("BigPharma Inc, Boston. Electronic address: bsmith@bigpharma.com."),
            Some("bsmith@bigpharma.com".to_string())
        );
        assert_eq!(extract_email("No address here"), None);
    }

    // === record classification ===

    #[test]
    fn test_record_with_zero_authors_yields_no_row() {
        assert_eq!(classify(&record_with(vec![])), None);
    }

    #[test]
    fn test_author_without_affiliations_is_never_industry() {
        let record = record_with(vec![author("Jane Doe", &[])]);
        assert_eq!(classify(&record), None);
    }

    #[test]
    fn test_purely_academic_record_yields_no_row() {
        let record = record_with(vec![author(
            "Alan Jones",
            &["Dept. of Biology, Example University, Cambridge, MA"],
        )]);
        assert_eq!(classify(&record), None);
    }

    #[test]
    fn test_single_industry_author_round_trip() {
        let record = record_with(vec![author(
            "Barbara Smith",
            &["BigPharma Inc, 10 Main St, Boston, MA 02118, USA; bsmith@bigpharma.com"],
        )]);

        let row = classify(&record).expect("expected a row");
        assert_eq!(row.pmid, "12345");
        assert_eq!(row.authors, vec!["Barbara Smith"]);
        assert_eq!(row.companies, vec!["BigPharma Inc"]);
        assert_eq!(row.email.as_deref(), Some("bsmith@bigpharma.com"));
    }

    #[test]
    fn test_mixed_record_lists_only_industry_authors() {
        let record = record_with(vec![
            author("Alan Jones", &["Example University, Cambridge, MA"]),
            author("Barbara Smith", &["Genentech Inc, South San Francisco, CA"]),
        ]);

        let row = classify(&record).expect("expected a row");
        assert_eq!(row.authors, vec!["Barbara Smith"]);
        assert_eq!(row.companies, vec!["Genentech Inc"]);
    }

    #[test]
    fn test_companies_deduplicate_across_authors_in_first_seen_order() {
        let record = record_with(vec![
            author("A One", &["Genentech Inc, South San Francisco"]),
            author("B Two", &["Genentech Inc, South San Francisco"]),
            author("C Three", &["Acme Therapeutics Ltd, London, UK"]),
        ]);

        let row = classify(&record).expect("expected a row");
        assert_eq!(row.authors, vec!["A One", "B Two", "C Three"]);
        assert_eq!(row.companies, vec!["Genentech Inc", "Acme Therapeutics Ltd"]);
    }

    #[test]
    fn test_multiple_industry_phrases_contribute_all_names() {
        let record = record_with(vec![author(
            "Dual Role",
            &["Alpha Pharmaceuticals, Basel; Beta Therapeutics Ltd, Zug"],
        )]);

        let row = classify(&record).expect("expected a row");
        assert_eq!(
            row.companies,
            vec!["Alpha Pharmaceuticals", "Beta Therapeutics Ltd"]
        );
    }

    #[test]
    fn test_email_only_author_falls_back_to_raw_phrase_company() {
        let record = record_with(vec![author("Solo Email", &["jdoe@acmebio.com"])]);

        let row = classify(&record).expect("expected a row");
        assert_eq!(row.companies, vec!["jdoe@acmebio.com"]);
        assert_eq!(row.email.as_deref(), Some("jdoe@acmebio.com"));
    }

    #[test]
    fn test_first_found_email_wins() {
        let record = record_with(vec![
            author("Alan Jones", &["Example University. ajones@example.edu"]),
            author("Barbara Smith", &["BigPharma Inc. bsmith@bigpharma.com"]),
        ]);

        let row = classify(&record).expect("expected a row");
        // First email in author order, even though that author is academic
        assert_eq!(row.email.as_deref(), Some("ajones@example.edu"));
    }

    #[test]
    fn test_classification_is_idempotent() {
        let record = record_with(vec![
            author("Alan Jones", &["Example University"]),
            author("Barbara Smith", &["Genentech Inc; bsmith@gene.com"]),
        ]);

        assert_eq!(classify(&record), classify(&record));
    }

    #[test]
    fn test_industry_author_with_empty_name_still_qualifies_record() {
        let record = record_with(vec![author("", &["Genentech Inc"])]);

        let row = classify(&record).expect("expected a row");
        assert!(row.authors.is_empty());
        assert_eq!(row.companies, vec!["Genentech Inc"]);
    }
}
