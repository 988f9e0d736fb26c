//! Suite selection by metadata
//!
//! Recognized keys are `applicationName` (case-insensitive substring) and
//! `testType` (exact `API`/`UI`). Every other key filters on tags; its value
//! is a comma-separated list where `!term` forbids a tag and `term` requires
//! one. All filters must hold.

use std::collections::BTreeMap;
use testforge_common::TestSuite;

/// Key/value filter arguments
pub type SuiteFilters = BTreeMap<String, String>;

/// Whether `suite` satisfies every filter
pub fn matches_filters(suite: &TestSuite, filters: &SuiteFilters) -> bool {
    filters.iter().all(|(key, value)| match key.as_str() {
        "applicationName" => suite
            .application_name
            .to_lowercase()
            .contains(&value.to_lowercase()),
        "testType" => suite.suite_type.to_string() == value.trim(),
        tag_key => matches_tag_filter(suite, tag_key, value),
    })
}

fn matches_tag_filter(suite: &TestSuite, key: &str, value: &str) -> bool {
    let has_tag = |term: &str| suite.tag_pairs().any(|(k, v)| k == key && v == term);

    value
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| match term.strip_prefix('!') {
            Some(forbidden) => !has_tag(forbidden.trim()),
            None => has_tag(term),
        })
}

/// Parse `key=value` pairs as given on the command line
pub fn parse_filter_args<I, S>(args: I) -> Result<SuiteFilters, String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    args.into_iter()
        .map(|arg| {
            let arg = arg.as_ref();
            arg.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .filter(|(k, _)| !k.is_empty())
                .ok_or_else(|| format!("invalid filter '{}', expected key=value", arg))
        })
        .collect()
}
