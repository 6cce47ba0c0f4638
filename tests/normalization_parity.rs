//! Frozen input/output pairs for company name normalization.
//!
//! Every pair here is a cache key and a temporary id in production. A change
//! to any expected value is a breaking change for stored data.

use company_id_resolver::normalization::{NameNormalizer, normalize};
use company_id_resolver::utils::generate_temp_id;
use rstest::rstest;

#[rstest]
#[case::plain("中国平安", "中国平安")]
#[case::trailing_space("中国平安 ", "中国平安")]
#[case::leading_space(" 中国平安", "中国平安")]
#[case::ideographic_space("某某公司\u{3000}", "某某公司")]
#[case::inner_space("中国 平安", "中国平安")]
#[case::dash_status_suffix("中国平安-已转出", "中国平安")]
#[case::status_prefix("已转出-中国平安", "中国平安")]
#[case::full_width_bracketed_status("中国平安（已转出）", "中国平安")]
#[case::lenticular_bracketed_status("中国平安【已注销】", "中国平安")]
#[case::stacked_status_suffixes("某某公司已转出转出", "某某公司")]
#[case::plan_marker("某某公司 团托", "某某公司")]
#[case::collective_plan_marker("某某公司_集合计划", "某某公司")]
#[case::subsidiaries_suffix("某某集团及下属子公司", "某某集团")]
#[case::own_subsidiaries_suffix("某某集团及其子公司", "某某集团")]
#[case::annuity_plan_suffix("某某企业年金计划", "某某")]
#[case::full_width_ascii("ＡＢＣ有限公司", "abc有限公司")]
#[case::brackets_in_name_kept("某某（集团）有限公司", "某某(集团)有限公司")]
#[case::marker_inside_name_kept("甲转出乙公司", "甲转出乙公司")]
#[case::empty("", "")]
#[case::only_whitespace(" \t ", "")]
#[case::only_marker("已转出", "")]
fn test_legacy_parity(#[case] raw: &str, #[case] expected: &str) {
    assert_eq!(normalize(raw), expected);
}

#[test]
fn test_lowercase_is_configurable() {
    assert_eq!(NameNormalizer::with_lowercase(false).normalize("ＡＢＣ有限公司"), "ABC有限公司");
    assert_eq!(NameNormalizer::with_lowercase(true).normalize("ＡＢＣ有限公司"), "abc有限公司");
}

#[rstest]
#[case("中国平安", "IN_MPUMIFIMZ3J36FMU")]
#[case("中国平安（已转出）", "IN_MPUMIFIMZ3J36FMU")]
#[case("", "IN_RFP6HFM5267IVH35")]
fn test_temporary_ids_follow_normalized_name(#[case] raw: &str, #[case] expected: &str) {
    assert_eq!(generate_temp_id(raw, "test-salt").unwrap(), expected);
}
