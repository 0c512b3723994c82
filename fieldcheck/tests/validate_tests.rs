//! End-to-end validation scenarios

use chrono::{DateTime, Duration, Utc};
use fieldcheck::{
    mode, Caches, Config, ConfigError, Context, ErrorList, FieldError, FieldInfo, Hook,
    Inspect, Record, RecordType, Shape, Validate, ValidateInContext, ValidateWith, Validator,
    ValidatorOption, Value, Verdict,
};
use proptest::prelude::*;
use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Default, Clone, Inspect)]
struct TestA {
    #[inspect(tag = r#"json:"a_1" check:"len(self) > 0""#)]
    f1: String,
}

fn a(s: &str) -> TestA {
    TestA { f1: s.to_string() }
}

#[derive(Debug, Default, Inspect)]
struct TestB {
    #[inspect(tag = r#"json:"b_1" check:"self != null && check(self)""#)]
    f1: Option<Box<TestA>>,
}

#[derive(Debug, Default, Inspect)]
struct TestC {
    #[inspect(tag = r#"json:"c_1" check:"self >  0""#)]
    f1: i64,
    #[inspect(tag = r#"json:"c_2" check:"self <= 0""#)]
    f2: i64,
    #[inspect(tag = r#"json:"c_3" check:"self == 0""#)]
    f3: i64,
    #[inspect(tag = r#"json:"c_4" check:"self != 0""#)]
    f4: i64,
    #[inspect(tag = r#"json:"c_5" check:"self == sup.f1""#)]
    f5: i64,
}

fn c(f1: i64, f2: i64, f3: i64, f4: i64, f5: i64) -> TestC {
    TestC { f1, f2, f3, f4, f5 }
}

#[derive(Debug, Default, Inspect)]
struct TestD {
    #[inspect(tag = r#"json:"d_1" check:"self""#)]
    f1: bool,
}

#[derive(Debug, Default, Inspect)]
struct TestE {
    #[inspect(tag = r#"json:"e_1" check:"len(self) > 0""#)]
    f1: Vec<i32>,
}

#[derive(Debug, Default, Inspect)]
struct TestF {
    #[inspect(tag = r#"json:"f_1" check:"len(self) > 0 && check(self)""#)]
    f1: Vec<TestA>,
}

#[derive(Debug, Default, Inspect)]
struct TestG {
    #[inspect(tag = r#"json:"g_1" check:"self > date(2018, 1, 1)""#)]
    f1: DateTime<Utc>,
    #[inspect(tag = r#"json:"g_2" check:"self > now()""#)]
    f2: DateTime<Utc>,
}

#[derive(Debug, Default, Inspect)]
struct TestH {
    #[inspect(tag = r#"json:"h_1" check:"self != null && check(self)""#)]
    f1: Option<Box<TestB>>,
}

#[derive(Debug, Default, Inspect)]
struct TestI {
    #[inspect(tag = r#"json:"i_1" check:"str.alpha(self)""#)]
    f1: String,
    #[inspect(tag = r#"json:"i_2" check:"len(self) > 0 && str.alpha(self)""#)]
    f2: String,
    #[inspect(tag = r#"json:"i_3" check:"len(self) > 0 && str.alphaNumeric(self)""#)]
    f3: String,
    #[inspect(tag = r#"json:"i_4" check:"len(self) > 0 && str.numeric(self)""#)]
    f4: String,
}

#[derive(Debug, Default, Inspect)]
struct TestJ {
    #[inspect(tag = r#"json:"j_1" check:"len(self) > 0" invalid:"F1 must not be empty""#)]
    f1: String,
    #[inspect(tag = r#"json:"j_2" check:"self > 0"  invalid:"F2 must not be zero, gotta be bigger""#)]
    f2: i64,
}

/// A string of 1 to 10 bytes, checked by its own hook
#[derive(Debug, Default)]
struct FieldA(String);

impl Inspect for FieldA {
    fn shape(&self) -> Shape<'_> {
        Shape::Leaf
    }

    fn to_value(&self) -> Value {
        self.0.to_value()
    }

    fn hook(&self) -> Hook<'_> {
        Hook::V1(self)
    }
}

impl Validate for FieldA {
    fn validate(&self) -> anyhow::Result<()> {
        if !(1..=10).contains(&self.0.len()) {
            anyhow::bail!("Must be between 1-10 bytes");
        }
        Ok(())
    }
}

#[derive(Debug, Default, Inspect)]
struct TestK {
    #[inspect(tag = r#"json:"k_1" check:"check ""#)]
    f1: FieldA,
    #[inspect(tag = r#"json:"k_2" check:"len(self) == 0""#)]
    f2: String,
}

#[derive(Debug, Default, Inspect)]
struct TestL {
    #[inspect(
        tag = r#"json:"l_1" check:"len(self) == 0 || str.match('#[0-9a-f]{6}', self)" invalid:"Pattern doesn't match""#
    )]
    f1: String,
}

#[derive(Debug, Default, Inspect)]
#[inspect(hooks(validate))]
struct TestM {
    #[inspect(tag = r#"json:"m_1" check:"len(self) == 3" invalid:"Wrong length""#)]
    f1: String,
}

impl Validate for TestM {
    fn validate(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default, Inspect)]
#[inspect(hooks(validate_with))]
struct TestN {
    #[inspect(tag = r#"json:"n_1" check:"len(self) == 3" invalid:"Wrong length""#)]
    f1: String,
}

impl ValidateWith for TestN {
    fn validate_with(&self, _validator: &Validator) -> Verdict {
        Verdict::proceed()
    }
}

#[derive(Debug, Default, Inspect)]
#[inspect(hooks(validate_with))]
struct TestO {
    #[inspect(tag = r#"json:"o_1" check:"len(self) == 3" invalid:"Wrong length""#)]
    f1: String,
}

impl ValidateWith for TestO {
    fn validate_with(&self, _validator: &Validator) -> Verdict {
        Verdict::proceed().with_error(FieldError::new("syn", "This is the problem"))
    }
}

#[derive(Debug, Default, Inspect)]
struct TestP {
    #[inspect(embed)]
    inner: TestA,
}

#[derive(Debug, Default, Inspect)]
struct TestQ {
    #[inspect(embed, tag = r#"check:"-""#)]
    inner: TestA,
}

/// Validate with the default validator; `messages` is only compared when non-empty
fn check_valid(value: &dyn Inspect, expect: &[&str], messages: &[&str]) {
    let errors = Validator::default().validate(value);
    assert_eq!(errors.fields(), expect, "{}", errors);
    if !messages.is_empty() {
        assert_eq!(errors.messages(), messages, "{}", errors);
    }
}

#[test]
fn test_non_empty_string() {
    check_valid(&TestA::default(), &["a_1"], &["constraint not satisfied: `len(self) > 0`"]);
    check_valid(&a("A"), &[], &[]);
}

#[test]
fn test_optional_record_with_check() {
    check_valid(&TestB::default(), &["b_1"], &[]);
    check_valid(
        &TestB {
            f1: Some(Box::new(TestA::default())),
        },
        &["b_1.a_1", "b_1"],
        &[],
    );
    check_valid(
        &TestB {
            f1: Some(Box::new(a("A"))),
        },
        &[],
        &[],
    );
}

#[test]
fn test_comparisons_and_sup() {
    check_valid(&c(0, 0, 0, 0, 1), &["c_1", "c_4", "c_5"], &[]);
    check_valid(&c(1, -1, 0, 1, 1), &[], &[]);
}

#[test]
fn test_boolean_field() {
    check_valid(&TestD::default(), &["d_1"], &[]);
    check_valid(&TestD { f1: true }, &[], &[]);
}

#[test]
fn test_sequence_length() {
    check_valid(&TestE::default(), &["e_1"], &[]);
    check_valid(&TestE { f1: vec![1, 2] }, &[], &[]);
}

#[test]
fn test_sequence_elements() {
    check_valid(&TestF::default(), &["f_1"], &[]);
    check_valid(&TestF { f1: vec![a("")] }, &["f_1[0].a_1", "f_1"], &[]);
    check_valid(&TestF { f1: vec![a("A")] }, &[], &[]);
}

#[test]
fn test_dates() {
    let now = Utc::now();
    check_valid(&TestG::default(), &["g_1", "g_2"], &[]);
    check_valid(
        &TestG {
            f1: now,
            f2: DateTime::<Utc>::default(),
        },
        &["g_2"],
        &[],
    );
    check_valid(
        &TestG {
            f1: now,
            f2: now + Duration::minutes(1),
        },
        &[],
        &[],
    );
}

#[test]
fn test_nested_checks() {
    check_valid(&TestH::default(), &["h_1"], &[]);
    check_valid(
        &TestH {
            f1: Some(Box::new(TestB::default())),
        },
        &["h_1.b_1", "h_1"],
        &[],
    );
    check_valid(
        &TestH {
            f1: Some(Box::new(TestB {
                f1: Some(Box::new(TestA::default())),
            })),
        },
        &["h_1.b_1.a_1", "h_1.b_1", "h_1"],
        &[],
    );
    check_valid(
        &TestH {
            f1: Some(Box::new(TestB {
                f1: Some(Box::new(a("A"))),
            })),
        },
        &[],
        &[],
    );
}

#[test]
fn test_string_predicates() {
    check_valid(&TestI::default(), &["i_2", "i_3", "i_4"], &[]);
    check_valid(
        &TestI {
            f1: String::new(),
            f2: "Abc".into(),
            f3: "123Abc".into(),
            f4: "987".into(),
        },
        &[],
        &[],
    );
}

#[test]
fn test_custom_messages() {
    check_valid(
        &TestJ::default(),
        &["j_1", "j_2"],
        &["F1 must not be empty", "F2 must not be zero, gotta be bigger"],
    );
}

#[test]
fn test_field_with_own_hook() {
    check_valid(&TestK::default(), &["k_1"], &["Must be between 1-10 bytes"]);
    check_valid(
        &TestK {
            f1: FieldA("This is too long. Way too long. Fix it.".into()),
            f2: String::new(),
        },
        &["k_1"],
        &["Must be between 1-10 bytes"],
    );
    check_valid(
        &TestK {
            f1: FieldA("A".into()),
            f2: String::new(),
        },
        &[],
        &[],
    );
}

#[test]
fn test_pattern_match() {
    check_valid(&TestL::default(), &[], &[]);
    check_valid(&TestL { f1: "#ff0033".into() }, &[], &[]);
    check_valid(
        &TestL { f1: "#ff003".into() },
        &["l_1"],
        &["Pattern doesn't match"],
    );
    check_valid(
        &TestL {
            f1: "_ff0033".into(),
        },
        &["l_1"],
        &["Pattern doesn't match"],
    );
}

#[test]
fn test_first_generation_hook_is_final() {
    check_valid(&TestM { f1: "111".into() }, &[], &[]);
    check_valid(&TestM { f1: "1".into() }, &[], &[]);
}

#[test]
fn test_second_generation_hook_can_proceed() {
    check_valid(&TestN { f1: "111".into() }, &[], &[]);
    check_valid(&TestN { f1: "1".into() }, &["n_1"], &["Wrong length"]);
}

#[test]
fn test_second_generation_hook_error_and_fields() {
    check_valid(
        &TestO { f1: "111".into() },
        &["syn"],
        &["This is the problem"],
    );
    check_valid(
        &TestO { f1: "1".into() },
        &["syn", "o_1"],
        &["This is the problem", "Wrong length"],
    );
}

#[test]
fn test_embedded_fields() {
    check_valid(&TestP::default(), &["a_1"], &[]);
    check_valid(&TestP { inner: a("Hello") }, &[], &[]);
    check_valid(&TestQ::default(), &[], &[]);
    check_valid(&TestQ { inner: a("Hello") }, &[], &[]);
}

#[derive(Debug, Default, Inspect)]
struct ModeA {
    #[inspect(tag = r#"json:"a_1" create:"len(self) > 0" invalid:"Wrong length""#)]
    f1: String,
    #[inspect(tag = r#"json:"a_2" create,update:"len(self) > 0" invalid:"Wrong length""#)]
    f2: String,
    #[inspect(tag = r#"json:"a_3""#)]
    f3: String,
}

#[test]
fn test_modes() {
    let value = ModeA::default();
    let fields = |name: &str| Validator::new([mode(name)]).validate(&value).fields();

    assert_eq!(fields("create"), vec!["a_1", "a_2"]);
    assert_eq!(fields("update"), vec!["a_2"]);
    assert!(fields("never_heard_of_it").is_empty());
    assert!(fields("create,update").is_empty());
}

#[test]
fn test_modes_build_independent_descriptors() {
    let caches = Arc::new(Caches::default());
    let create = Validator::with_caches(
        Config::default().with_options([mode("create")]),
        Arc::clone(&caches),
    );
    let update = Validator::with_caches(
        Config::default().with_options([mode("update")]),
        Arc::clone(&caches),
    );

    let value = ModeA::default();
    assert_eq!(create.validate(&value).fields(), vec!["a_1", "a_2"]);
    assert_eq!(update.validate(&value).fields(), vec!["a_2"]);
    assert_eq!(create.validate(&value).fields(), vec!["a_1", "a_2"]);

    assert_eq!(caches.types().len(), 2);
    // Both modes share the `len(self) > 0` program
    assert_eq!(caches.expressions().len(), 1);
}

#[test]
fn test_disabled_caches_give_same_results() {
    let uncached = Validator::with_caches(Config::default(), Arc::new(Caches::disabled()));
    let value = TestH {
        f1: Some(Box::new(TestB {
            f1: Some(Box::new(TestA::default())),
        })),
    };
    assert_eq!(
        uncached.validate(&value).fields(),
        vec!["h_1.b_1.a_1", "h_1.b_1", "h_1"]
    );
    assert!(uncached.caches().types().is_empty());
}

#[test]
fn test_base_path() {
    let validator = Validator::new([ValidatorOption::BasePath("body".into())]);
    assert_eq!(
        validator.validate(&TestF { f1: vec![a("")] }).fields(),
        vec!["body.f_1[0].a_1", "body.f_1"]
    );
}

#[test]
fn test_custom_name_tag() {
    #[derive(Inspect)]
    struct Row {
        #[inspect(tag = r#"db:"user_id" json:"userId" check:"self > 0""#)]
        id: i64,
        #[inspect(tag = r#"check:"self > 0""#)]
        count: i64,
    }

    let row = Row { id: 0, count: 0 };
    let by_db = Validator::new([ValidatorOption::NameTag("db".into())]);
    assert_eq!(by_db.validate(&row).fields(), vec!["user_id", "count"]);
    assert_eq!(Validator::default().validate(&row).fields(), vec!["userId", "count"]);
}

#[test]
fn test_top_level_sequence_paths() {
    let items = vec![a(""), a("ok"), a("")];
    assert_eq!(
        Validator::default().validate(&items).fields(),
        vec!["[0].a_1", "[2].a_1"]
    );
}

#[derive(Debug, Default, Inspect)]
struct Quiet {
    #[inspect(tag = r#"json:"f" check:"self == 'x'" invalid:"-""#)]
    f: String,
}

#[derive(Debug, Default, Inspect)]
struct Loud {
    #[inspect(tag = r#"json:"quiet" check:"check(self)""#)]
    quiet: Quiet,
}

#[test]
fn test_suppressed_errors_still_invalidate() {
    assert!(Validator::default().validate(&Quiet::default()).is_empty());

    let errors = Validator::default().validate(&Loud::default());
    assert_eq!(errors.fields(), vec!["quiet"]);
    assert_eq!(
        errors.messages(),
        vec!["constraint not satisfied: `check(self)`"]
    );

    let fine = Loud {
        quiet: Quiet { f: "x".into() },
    };
    assert!(Validator::default().validate(&fine).is_empty());
}

#[derive(Debug, Default, Inspect)]
#[inspect(hooks(validate, validate_in_context))]
struct BothHooks {
    #[inspect(tag = r#"json:"name" check:"len(self) > 0""#)]
    name: String,
}

impl Validate for BothHooks {
    fn validate(&self) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("never used"))
    }
}

impl ValidateInContext for BothHooks {
    fn validate_in_context(&self, _validator: &Validator, _cx: &Context) -> Verdict {
        Verdict::done()
    }
}

#[test]
fn test_context_hook_takes_precedence() {
    assert!(Validator::default().validate(&BothHooks::default()).is_empty());
}

#[derive(Debug, Default, Inspect)]
#[inspect(hooks(validate_in_context))]
struct Range {
    #[inspect(tag = r#"json:"start" check:"self >= 0""#)]
    start: i64,
    #[inspect(tag = r#"json:"end""#)]
    end: i64,
}

impl ValidateInContext for Range {
    fn validate_in_context(&self, _validator: &Validator, cx: &Context) -> Verdict {
        if self.start > self.end {
            let at = cx.with_field_alternates(&["start", "end"]);
            return Verdict::proceed().with_error(FieldError::new(at.path(), "start after end"));
        }
        Verdict::proceed()
    }
}

#[derive(Debug, Default, Inspect)]
struct Booking {
    #[inspect(tag = r#"json:"when" check:"check""#)]
    when: Range,
}

#[test]
fn test_context_hook_reports_at_path() {
    let booking = Booking {
        when: Range { start: -1, end: -5 },
    };
    let errors = Validator::default().validate(&booking);
    assert_eq!(errors.fields(), vec!["when.{start,end}", "when.start"]);
    assert_eq!(errors.messages()[0], "start after end");
}

#[derive(Debug, Default, Inspect)]
#[inspect(hooks(validate_in_context))]
struct Envelope {
    payload: Vec<TestA>,
}

impl ValidateInContext for Envelope {
    fn validate_in_context(&self, validator: &Validator, cx: &Context) -> Verdict {
        match validator.validate_at(&cx.with_field("data"), &self.payload) {
            Ok(errors) if errors.is_empty() => Verdict::done(),
            Ok(errors) => Verdict::done().with_error(errors),
            Err(err) => Verdict::done().with_error(err),
        }
    }
}

#[test]
fn test_hook_validates_nested_values() {
    let envelope = Envelope {
        payload: vec![a("ok"), a("")],
    };
    let errors = Validator::default().validate(&envelope);
    assert_eq!(errors.fields(), vec!["data[1].a_1"]);
}

#[derive(Debug, Default, Inspect)]
#[inspect(hooks(validate))]
struct Opaque {
    #[inspect(skip)]
    secret: String,
}

impl Validate for Opaque {
    fn validate(&self) -> anyhow::Result<()> {
        if self.secret.is_empty() {
            return Err(anyhow::anyhow!("secret is missing"));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Inspect)]
struct Holder {
    #[inspect(tag = r#"json:"opaque" check:"check""#)]
    opaque: Opaque,
}

#[test]
fn test_plain_hook_errors_use_current_path() {
    let errors = Validator::default().validate(&Holder::default());
    assert_eq!(errors.fields(), vec!["opaque"]);
    assert_eq!(errors.messages(), vec!["secret is missing"]);

    let errors = Validator::default().validate(&Opaque::default());
    assert_eq!(errors.fields(), vec!["<entity>"]);
}

#[derive(Debug, Default, Inspect)]
struct Ranged {
    #[inspect(tag = r#"json:"low""#)]
    low: i64,
    #[inspect(
        tag = r#"json:"high" check:"self >= sup.low ? [] : [errorAt('min', 'below low'), error('out of range')]""#
    )]
    high: i64,
}

#[test]
fn test_expression_error_values() {
    let errors = Validator::default().validate(&Ranged { low: 5, high: 1 });
    assert_eq!(errors.fields(), vec!["high.min", "high"]);
    assert_eq!(errors.messages(), vec!["below low", "out of range"]);
    assert!(Validator::default()
        .validate(&Ranged { low: 1, high: 5 })
        .is_empty());
}

#[derive(Debug, Default, Inspect)]
struct Weird {
    #[inspect(tag = r#"json:"w" check:"self + 1""#)]
    w: i64,
}

#[test]
fn test_unexpected_result_type() {
    let errors = Validator::default().validate(&Weird::default());
    assert_eq!(errors.fields(), vec!["w"]);
    assert!(errors.messages()[0].starts_with("invalid expression result: int"));
}

#[derive(Debug, Default, Inspect)]
struct Generic<T> {
    #[inspect(tag = r#"json:"inner" check:"check""#)]
    inner: T,
}

#[test]
fn test_generic_records() {
    let errors = Validator::default().validate(&Generic { inner: a("") });
    assert_eq!(errors.fields(), vec!["inner.a_1"]);
    assert!(Validator::default()
        .validate(&Generic { inner: 42 })
        .is_empty());
}

#[derive(Debug, Default, Inspect)]
struct Broken {
    #[inspect(tag = r#"json:"b" check:"len(self) >""#)]
    b: String,
}

#[test]
#[should_panic(expected = "could not compile expression")]
fn test_compile_error_panics() {
    Validator::default().validate(&Broken::default());
}

#[test]
fn test_compile_error_is_returned() {
    let err = Validator::default()
        .try_validate(&Broken::default())
        .unwrap_err();
    assert!(matches!(err, ConfigError::Compile { .. }));
}

#[derive(Debug, Default, Inspect)]
struct BadPattern {
    #[inspect(tag = r#"json:"p" check:"str.match('[oops', self)""#)]
    p: String,
}

#[derive(Debug, Default, Inspect)]
struct NoLength {
    #[inspect(tag = r#"json:"n" check:"len(self) > 0""#)]
    n: i64,
}

#[derive(Debug, Default, Inspect)]
struct CheckOther {
    #[inspect(tag = r#"json:"o" check:"check(sup)""#)]
    o: String,
}

#[test]
fn test_evaluation_failures_are_config_errors() {
    let validator = Validator::default();
    for result in [
        validator.try_validate(&BadPattern::default()),
        validator.try_validate(&NoLength::default()),
        validator.try_validate(&CheckOther::default()),
    ] {
        assert!(matches!(result, Err(ConfigError::Evaluate { .. })), "{:?}", result);
    }
}

#[test]
#[should_panic(expected = "fieldcheck configuration error")]
fn test_bad_pattern_panics() {
    Validator::default().validate(&BadPattern { p: "x".into() });
}

/// A record whose second field cannot be read
struct Sealed;

static SEALED_FIELDS: [FieldInfo; 1] = [FieldInfo {
    ident: "hidden",
    annotations: r#"check:"self > 0""#,
    embedded: false,
}];

impl Inspect for Sealed {
    fn shape(&self) -> Shape<'_> {
        Shape::Record(self)
    }

    fn to_value(&self) -> Value {
        Value::Null
    }
}

impl Record for Sealed {
    fn record_type(&self) -> RecordType {
        RecordType::of::<Self>()
    }

    fn fields(&self) -> &'static [FieldInfo] {
        &SEALED_FIELDS
    }

    fn field(&self, _index: usize) -> Option<&dyn Inspect> {
        None
    }
}

#[test]
fn test_unreadable_field() {
    let err = Validator::default().try_validate(&Sealed).unwrap_err();
    assert!(
        matches!(err, ConfigError::UnreadableField { field: "hidden", .. }),
        "{}",
        err
    );
}

#[derive(Debug, Default, Inspect)]
struct Tagged {
    #[inspect(tag = r#"json:"labels" check:"check""#)]
    labels: std::collections::HashMap<String, String>,
    #[inspect(tag = r#"json:"count" check:"len(sup.labels) == self""#)]
    count: i64,
}

#[test_log::test]
fn test_maps_are_not_traversed_unless_strict() {
    let value = Tagged::default();
    assert!(Validator::default().validate(&value).is_empty());

    let strict = Validator::new([ValidatorOption::Strict(true)]);
    let err = strict.try_validate(&value).unwrap_err();
    assert!(matches!(err, ConfigError::UnsupportedShape { ref path, .. } if path == "labels"));
}

#[test]
fn test_error_list_output() {
    let errors = Validator::default().validate(&TestJ::default());
    assert_eq!(
        errors.to_string(),
        "2 field errors\n  - j_1: F1 must not be empty\n  - j_2: F2 must not be zero, gotta be bigger"
    );

    let json = serde_json::to_value(&errors).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "error": "2 field errors",
            "fields": [
                {"field": "j_1", "message": "F1 must not be empty"},
                {"field": "j_2", "message": "F2 must not be zero, gotta be bigger"},
            ]
        })
    );
}

#[test]
fn test_concurrent_validation_shares_caches() {
    let validator = Validator::with_caches(Config::default(), Arc::new(Caches::default()));
    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                for i in 0..50 {
                    let value = c(i % 2, 0, 0, 1, i % 2);
                    let expected: Vec<&str> = if i % 2 == 0 { vec!["c_1"] } else { vec![] };
                    assert_eq!(validator.validate(&value).fields(), expected);
                }
            });
        }
    });
    assert_eq!(validator.caches().types().len(), 1);
}

#[derive(Debug, Default, Inspect)]
#[inspect(hooks(validate))]
struct Located {
    #[inspect(skip)]
    at: String,
}

impl Validate for Located {
    fn validate(&self) -> anyhow::Result<()> {
        use anyhow::Context as _;
        Err(FieldError::new(self.at.clone(), "explicit")).context("looking up the location")
    }
}

#[derive(Debug, Default, Inspect)]
struct Trip {
    #[inspect(tag = r#"json:"stop" check:"check""#)]
    stop: Located,
}

#[test]
fn test_field_errors_survive_anyhow_context() {
    let located = Located {
        at: "somewhere".into(),
    };
    let errors = Validator::default().validate(&located);
    assert_eq!(errors.fields(), vec!["somewhere"]);
    assert_eq!(errors.messages(), vec!["explicit"]);

    let errors = Validator::default().validate(&Trip { stop: located });
    assert_eq!(errors.fields(), vec!["somewhere"]);
}

#[derive(Debug, Default, Inspect)]
#[inspect(hooks(validate_with))]
struct Counted {
    #[inspect(skip)]
    calls: Arc<AtomicUsize>,
}

impl ValidateWith for Counted {
    fn validate_with(&self, _validator: &Validator) -> Verdict {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Verdict::done()
    }
}

#[derive(Debug, Default, Inspect)]
struct Shortcut {
    #[inspect(tag = r#"json:"skipped" check:"true || check(self)""#)]
    skipped: Counted,
    #[inspect(tag = r#"json:"reached" check:"false || check(self)""#)]
    reached: Counted,
}

#[test]
fn test_check_runs_only_when_reached() {
    let value = Shortcut::default();
    assert!(Validator::default().validate(&value).is_empty());
    assert_eq!(value.skipped.calls.load(Ordering::SeqCst), 0);
    assert_eq!(value.reached.calls.load(Ordering::SeqCst), 1);
}

#[derive(Debug, Default, Inspect)]
struct OptionalLabels {
    #[inspect(tag = r#"json:"m" check:"len(self) == 0 || check(self)""#)]
    m: std::collections::HashMap<String, String>,
}

#[test]
fn test_unreached_check_cannot_fail_strict_mode() {
    let strict = Validator::new([ValidatorOption::Strict(true)]);
    assert!(strict
        .try_validate(&OptionalLabels::default())
        .unwrap()
        .is_empty());

    let mut labels = OptionalLabels::default();
    labels.m.insert("k".into(), "v".into());
    let err = strict.try_validate(&labels).unwrap_err();
    assert!(matches!(err, ConfigError::UnsupportedShape { ref path, .. } if path == "m"));
}

#[derive(Debug, Default, Inspect)]
#[inspect(hooks(validate))]
struct Audit {
    #[inspect(tag = r#"json:"by" check:"len(self) > 0""#)]
    by: String,
}

impl Validate for Audit {
    fn validate(&self) -> anyhow::Result<()> {
        anyhow::bail!("audit hook is not consulted for embedded members")
    }
}

#[derive(Debug, Default, Inspect)]
struct Document {
    #[inspect(embed)]
    audit: Option<Box<Audit>>,
}

#[test]
fn test_embedded_wrappers_skip_hooks() {
    let unsigned = Document {
        audit: Some(Box::new(Audit::default())),
    };
    check_valid(&unsigned, &["by"], &[]);

    let signed = Document {
        audit: Some(Box::new(Audit { by: "me".into() })),
    };
    check_valid(&signed, &[], &[]);
    check_valid(&Document::default(), &[], &[]);
}

/// A leaf that counts its conversions into the expression language
#[derive(Debug, Default)]
struct Tracked {
    value: i64,
    conversions: Cell<usize>,
}

impl Inspect for Tracked {
    fn shape(&self) -> Shape<'_> {
        Shape::Leaf
    }

    fn to_value(&self) -> Value {
        self.conversions.set(self.conversions.get() + 1);
        Value::Int(self.value)
    }
}

#[derive(Debug, Default, Inspect)]
struct TrackedPair {
    #[inspect(tag = r#"json:"low" check:"self >= 0""#)]
    low: Tracked,
    #[inspect(tag = r#"json:"high" check:"self >= sup.low""#)]
    high: Tracked,
}

#[derive(Debug, Default, Inspect)]
struct TrackedOuter {
    #[inspect(tag = r#"json:"pair" check:"check(self)""#)]
    pair: TrackedPair,
}

#[test]
fn test_values_are_converted_once() {
    let value = TrackedOuter::default();
    assert!(Validator::default().validate(&value).is_empty());
    assert_eq!(value.pair.low.conversions.get(), 1);
    assert_eq!(value.pair.high.conversions.get(), 1);
}

#[derive(Debug, Default, Inspect)]
struct Unannotated {
    name: String,
    count: i64,
    items: Vec<TestA>,
}

fn assert_same(left: &ErrorList, right: &ErrorList) {
    assert_eq!(left.fields(), right.fields());
    assert_eq!(left.messages(), right.messages());
}

proptest! {
    #[test]
    fn prop_unannotated_records_are_valid(name in ".*", count in any::<i64>(), n in 0usize..4) {
        let value = Unannotated { name, count, items: vec![TestA::default(); n] };
        prop_assert!(Validator::default().validate(&value).is_empty());
    }

    #[test]
    fn prop_validation_is_idempotent(
        f1 in -3i64..3, f2 in -3i64..3, f3 in -3i64..3, f4 in -3i64..3, f5 in -3i64..3,
    ) {
        let validator = Validator::default();
        let value = c(f1, f2, f3, f4, f5);
        assert_same(&validator.validate(&value), &validator.validate(&value));
    }

    #[test]
    fn prop_sequence_errors_are_indexed(flags in proptest::collection::vec(any::<bool>(), 0..8)) {
        let items: Vec<TestA> = flags.iter().map(|ok| a(if *ok { "A" } else { "" })).collect();
        let expected: Vec<String> = flags
            .iter()
            .enumerate()
            .filter(|(_, ok)| !**ok)
            .map(|(i, _)| format!("f_1[{}].a_1", i))
            .collect();

        let errors = Validator::default().validate(&TestF { f1: items });
        let fields = errors.fields();
        prop_assert_eq!(&fields[..expected.len()], &expected[..]);
    }
}
