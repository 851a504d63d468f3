//! The crash-stats catalogue as data.
//!
//! One record per model. Redacted and unredacted views of the same backend
//! query are separate records that differ only in permissions and
//! redaction.

use crashstats_core::{ModelDescriptor, ParamDefault, ParamKind, ParamSpec, Permission};

const PUBLIC_CACHE_SECONDS: u64 = 3600;

fn string(name: &str) -> ParamSpec {
    ParamSpec::new(name, ParamKind::String)
}

fn int(name: &str) -> ParamSpec {
    ParamSpec::new(name, ParamKind::Int)
}

fn boolean(name: &str) -> ParamSpec {
    ParamSpec::new(name, ParamKind::Bool)
}

fn date(name: &str) -> ParamSpec {
    ParamSpec::new(name, ParamKind::Date)
}

fn list(name: &str) -> ParamSpec {
    ParamSpec::new(name, ParamKind::StringList)
}

fn int_list(name: &str) -> ParamSpec {
    ParamSpec::new(name, ParamKind::IntList)
}

/// Fields never shown in the public search view
const SEARCH_HIDDEN_FIELDS: [&str; 3] = ["email", "url", "exploitability"];

/// Parameters whose values name result fields
const SEARCH_FIELD_SELECTORS: [&str; 4] = ["_facets", "_aggs.", "_histogram.", "_columns"];

pub fn catalogue() -> Vec<ModelDescriptor> {
    vec![
        // Registered bases; never addressable
        ModelDescriptor::internal("SocorroMiddleware"),
        ModelDescriptor::internal("ESSocorroMiddleware"),
        ModelDescriptor::internal("Field"),
        crashes_per_adu(),
        ModelDescriptor::query("ProductVersions", "products")
            .with_description(
                "Products and their versions.\n    \
                 Filter by product, version, build type or date range.",
            )
            .with_optional(list("product"))
            .with_optional(list("version"))
            .with_optional(boolean("active"))
            .with_optional(boolean("is_featured"))
            .with_optional(date("start_date"))
            .with_optional(date("end_date"))
            .with_optional(list("build_type"))
            .cache_for(PUBLIC_CACHE_SECONDS),
        ModelDescriptor::query("Platforms", "platforms")
            .with_description("Operating system platforms known to the crash store.")
            .cache_for(PUBLIC_CACHE_SECONDS),
        tcbs(),
        ModelDescriptor::query("ProcessedCrash", "crash_data")
            .with_description(
                "A processed crash, by crash ID.\n    \
                 Personal and exploitability fields are withheld.",
            )
            .with_required(string("crash_id").forwarded_as("uuid"))
            .with_implicit("datatype", "processed")
            .drop_fields(&["url", "email"])
            .drop_fields_unless(&["exploitability"], Permission::ViewExploitability)
            .scrub_fields(&["user_comments"]),
        ModelDescriptor::query("UnredactedCrash", "crash_data")
            .with_description("A processed crash with every field intact.")
            .with_required(string("crash_id").forwarded_as("uuid"))
            .with_implicit("datatype", "unredacted")
            .requires(Permission::ViewExploitability)
            .requires(Permission::ViewPii),
        raw_crash(),
        ModelDescriptor::query("Bugs", "bugs")
            .with_description("Bug associations for one or more signatures.")
            .with_required(list("signatures"))
            .cache_for(PUBLIC_CACHE_SECONDS),
        ModelDescriptor::query("SignaturesByBugs", "bugs")
            .with_description("Signatures associated with one or more bug IDs.")
            .with_required(int_list("bug_ids"))
            .cache_for(PUBLIC_CACHE_SECONDS),
        ModelDescriptor::query("SignatureTrend", "crashes/signature_history")
            .with_description("Daily crash counts for one signature.")
            .with_required(string("product"))
            .with_required(string("version"))
            .with_required(string("signature"))
            .with_required(date("end_date"))
            .with_required(date("start_date"))
            .cache_for(PUBLIC_CACHE_SECONDS),
        ModelDescriptor::query("NewSignatures", "signatures/new")
            .with_description("Signatures first seen within a date range.")
            .with_optional(date("start_date"))
            .with_optional(date("end_date"))
            .with_optional(date("not_after"))
            .with_optional(list("product").with_default(ParamDefault::DefaultProduct))
            .with_optional(list("version"))
            .cache_for(PUBLIC_CACHE_SECONDS),
        ModelDescriptor::query("Status", "server_status")
            .with_description("Processing status of the crash pipeline."),
        ModelDescriptor::query("CrontabberState", "crontabber_state")
            .with_description("State of every scheduled job."),
        ModelDescriptor::query("Correlations", "correlations")
            .with_description("Correlation report for one signature on one platform.")
            .with_required(string("report_type"))
            .with_required(string("product"))
            .with_required(string("version"))
            .with_required(string("signature"))
            .with_required(string("platform"))
            .cache_for(PUBLIC_CACHE_SECONDS),
        ModelDescriptor::query("CorrelationsSignatures", "correlations/signatures")
            .with_description("Signatures with correlation reports available.")
            .with_required(string("report_type"))
            .with_required(string("product"))
            .with_required(string("version"))
            .with_optional(list("platforms"))
            .cache_for(PUBLIC_CACHE_SECONDS),
        ModelDescriptor::query("CrashesByExploitability", "crashes/exploitability")
            .with_description("Signatures ranked by exploitability, in pages.")
            .with_required(int("batch"))
            .with_optional(int("page").with_default(ParamDefault::Int(1)))
            .with_optional(string("product"))
            .with_optional(string("version"))
            .with_optional(date("start_date"))
            .with_optional(date("end_date"))
            .requires(Permission::ViewExploitability),
        ModelDescriptor::query("ProductBuildTypes", "products/build_types")
            .with_description("Build types and their throttle for one product.")
            .with_required(string("product"))
            .cache_for(PUBLIC_CACHE_SECONDS),
        ModelDescriptor::query("SuperSearch", "supersearch")
            .with_description(
                "Search crash reports by any field.\n    \
                 Personal fields are withheld and cannot be faceted on.",
            )
            .with_optional(int("_results_number"))
            .with_optional(int("_results_offset"))
            .with_open_params()
            .drop_fields(&SEARCH_HIDDEN_FIELDS)
            .scrub_fields(&["user_comments"])
            .with_field_selectors(&SEARCH_FIELD_SELECTORS),
        ModelDescriptor::query("SuperSearchUnredacted", "supersearch")
            .with_description("Search crash reports by any field, personal fields included.")
            .with_optional(int("_results_number"))
            .with_optional(int("_results_offset"))
            .with_open_params()
            .requires(Permission::ViewExploitability)
            .requires(Permission::ViewPii),
        ModelDescriptor::action("Reprocessing", "reprocessing")
            .with_description("Send crashes back through processing. POST only.")
            .with_required(list("crash_ids"))
            .requires(Permission::ReprocessCrashes),
    ]
}

fn crashes_per_adu() -> ModelDescriptor {
    ModelDescriptor::query("CrashesPerAdu", "crashes/daily")
        .with_description(
            "Crashes per active daily user.\n    \
             Counts are broken down by version and day.",
        )
        .with_required(string("product"))
        .with_required(list("versions"))
        .with_optional(date("from_date"))
        .with_optional(date("to_date"))
        .with_optional(string("date_range_type"))
        .with_optional(list("os"))
        .with_optional(string("report_type"))
        .cache_for(PUBLIC_CACHE_SECONDS)
}

fn tcbs() -> ModelDescriptor {
    ModelDescriptor::query("TCBS", "crashes/signatures")
        .with_description("Top crashers by signature for a product version.")
        .with_required(string("product"))
        .with_required(string("version"))
        .with_optional(string("crash_type"))
        .with_optional(date("end_date"))
        .with_optional(string("date_range_type"))
        .with_optional(int("duration"))
        .with_optional(int("limit").with_default(ParamDefault::Int(300)))
        .with_optional(string("os"))
        .cache_for(PUBLIC_CACHE_SECONDS)
}

fn raw_crash() -> ModelDescriptor {
    ModelDescriptor::query("RawCrash", "crash_data")
        .with_description(
            "The raw crash as submitted.\n    \
             format=raw downloads the minidump and needs the raw dump permission.",
        )
        .with_required(string("crash_id").forwarded_as("uuid"))
        .with_optional(
            ParamSpec::new("format", ParamKind::choice(&["json", "raw"]))
                .with_default(ParamDefault::Str("json".into())),
        )
        .with_optional(string("name"))
        .with_gate("format", Some("raw"), Permission::ViewRawdump)
        .with_binary("crash_id", "dmp", "format", "raw")
        .drop_fields(&["URL", "Email"])
        .scrub_fields(&["Comments"])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_names_are_unique() {
        let models = catalogue();
        let names: HashSet<_> = models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names.len(), models.len());
    }

    #[test]
    fn test_tcbs_limit_default() {
        let tcbs = tcbs();
        let limit = tcbs.param_spec("limit").unwrap();
        assert_eq!(limit.default, Some(ParamDefault::Int(300)));
    }

    #[test]
    fn test_raw_crash_gate_and_attachment() {
        let raw = raw_crash();
        assert_eq!(raw.param_gates.len(), 1);
        assert_eq!(raw.param_gates[0].permission, Permission::ViewRawdump);
        assert_eq!(raw.param_spec("crash_id").unwrap().backend_name(), "uuid");
        assert!(raw.binary.is_some());
    }

    #[test]
    fn test_crash_models_are_not_cached() {
        for model in catalogue() {
            if model.backend_endpoint == "crash_data" || model.backend_endpoint == "supersearch" {
                assert!(!model.is_cacheable(), "{} must not be cached", model.name);
            }
        }
    }
}
