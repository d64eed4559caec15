use fnsign::fnsign::canonical::{body_digest, Canonicalizer, EMPTY_BODY_SHA256};
use fnsign::fnsign::credentials::Credential;
use fnsign::fnsign::signer::{sign, HmacSha256Signer, SigningContext};

const TIMESTAMP: &str = "20240101T120000Z";
const GET_ORDERS_SIGNATURE: &str =
    "d06b69c23e562375d6f6fa4f0c844de5a7df1776bf32eb574cf4ffe50d3f02fd";

fn sign_get(path: &str, query: &str) -> String {
    let canonical = Canonicalizer::default().build("GET", path, query, EMPTY_BODY_SHA256);
    sign("s3cr3t", TIMESTAMP, "AKID1", &canonical)
}

#[test]
fn test_known_get_signature() {
    assert_eq!(sign_get("/orders", "status=open"), GET_ORDERS_SIGNATURE);
}

#[test]
fn test_known_post_signature() {
    let body = br#"{"item":"book"}"#;
    let digest = body_digest(body);
    assert_eq!(
        digest,
        "4ddc693ce39779d2725b70213ef414e8020b7bda853b0b22fe09354deadb2898"
    );

    let canonical = Canonicalizer::default().build("POST", "/orders", "", &digest);
    assert_eq!(
        sign("s3cr3t", TIMESTAMP, "AKID1", &canonical),
        "8db7676c5daa887680beb3b0f9fc0d9deaa12252e43627ac662802a09abc1b66"
    );
}

#[test]
fn test_query_order_does_not_change_signature() {
    let expected = "a0fb4d790fd33e642c27cb703b5d882c22b778771d309a9160c1f337c5e48a0c";

    assert_eq!(sign_get("/orders", "a=1&b=two%20words&status=open"), expected);
    assert_eq!(sign_get("/orders", "status=open&b=two+words&a=1"), expected);
    assert_eq!(sign_get("/orders", "b=two%20words&status=open&a=1"), expected);
}

#[test]
fn test_every_component_changes_signature() {
    let baseline = sign_get("/orders", "status=open");

    assert_ne!(sign_get("/orders2", "status=open"), baseline);
    assert_ne!(sign_get("/orders", "status=closed"), baseline);
    assert_ne!(sign_get("/orders", ""), baseline);

    let canonical = Canonicalizer::default().build("GET", "/orders", "status=open", EMPTY_BODY_SHA256);
    assert_ne!(sign("s3cr3u", TIMESTAMP, "AKID1", &canonical), baseline);
    assert_ne!(sign("s3cr3t", "20240101T120001Z", "AKID1", &canonical), baseline);
    assert_ne!(sign("s3cr3t", TIMESTAMP, "AKID2", &canonical), baseline);

    let post = Canonicalizer::default().build("POST", "/orders", "status=open", EMPTY_BODY_SHA256);
    assert_ne!(sign("s3cr3t", TIMESTAMP, "AKID1", &post), baseline);

    let with_body =
        Canonicalizer::default().build("GET", "/orders", "status=open", &body_digest(b"x"));
    assert_ne!(sign("s3cr3t", TIMESTAMP, "AKID1", &with_body), baseline);
}

#[test]
fn test_equivalent_paths_sign_identically() {
    assert_eq!(sign_get("/a%20b", ""), sign_get("/a b", ""));
    assert_eq!(sign_get("/%7Euser", ""), sign_get("/~user", ""));
    assert_eq!(sign_get("", ""), sign_get("/", ""));
}

#[test]
fn test_separator_encoding_is_part_of_the_contract() {
    let keep = Canonicalizer::new(false).build("GET", "/a/b", "", EMPTY_BODY_SHA256);
    let encode = Canonicalizer::new(true).build("GET", "/a/b", "", EMPTY_BODY_SHA256);

    assert_eq!(keep, format!("GET\n/a/b\n\n{}", EMPTY_BODY_SHA256));
    assert_eq!(encode, format!("GET\n%2Fa%2Fb\n\n{}", EMPTY_BODY_SHA256));
    assert_ne!(
        sign("s3cr3t", TIMESTAMP, "AKID1", &keep),
        sign("s3cr3t", TIMESTAMP, "AKID1", &encode)
    );
}

#[test]
fn test_signing_context_matches_free_function() {
    let credential = Credential::new("AKID1", "s3cr3t").unwrap();
    let context = SigningContext::build(
        &Canonicalizer::default(),
        &HmacSha256Signer,
        "GET",
        "/orders",
        "status=open",
        EMPTY_BODY_SHA256,
        TIMESTAMP,
        credential,
    );

    assert_eq!(context.signature(), GET_ORDERS_SIGNATURE);
    assert_eq!(context.canonical_path(), "/orders");
    assert_eq!(context.canonical_query(), "status=open");
    assert_eq!(
        context.canonical_request(),
        Canonicalizer::default().build("GET", "/orders", "status=open", EMPTY_BODY_SHA256)
    );
    assert!(context
        .string_to_sign()
        .starts_with("HMAC-SHA256-20240101T120000Z\nAKID1\n"));

    // The secret never shows up in debug output.
    assert!(!format!("{:?}", context).contains("s3cr3t"));
}

fn changed_lines(a: &str, b: &str) -> Vec<usize> {
    let a: Vec<&str> = a.split('\n').collect();
    let b: Vec<&str> = b.split('\n').collect();
    assert_eq!(a.len(), 4);
    assert_eq!(b.len(), 4);

    (0..4).filter(|&i| a[i] != b[i]).collect()
}

#[test]
fn test_single_byte_change_moves_exactly_one_canonical_line() {
    let canonicalizer = Canonicalizer::default();
    let digest = body_digest(br#"{"item":"book"}"#);
    let baseline = canonicalizer.build("POST", "/orders", "status=open", &digest);

    // method, path, query, body digest
    let cases = [
        (canonicalizer.build("PUT", "/orders", "status=open", &digest), 0),
        (canonicalizer.build("POSU", "/orders", "status=open", &digest), 0),
        (canonicalizer.build("POST", "/orderz", "status=open", &digest), 1),
        (canonicalizer.build("POST", "/orders", "status=opem", &digest), 2),
        (canonicalizer.build("POST", "/orders", "statuz=open", &digest), 2),
        (
            canonicalizer.build("POST", "/orders", "status=open", &body_digest(br#"{"item":"boom"}"#)),
            3,
        ),
        (
            canonicalizer.build("POST", "/orders", "status=open", EMPTY_BODY_SHA256),
            3,
        ),
    ];

    for (changed, line) in cases {
        assert_eq!(changed_lines(&baseline, &changed), vec![line], "{:?}", changed);
        assert_ne!(
            sign("s3cr3t", TIMESTAMP, "AKID1", &changed),
            sign("s3cr3t", TIMESTAMP, "AKID1", &baseline)
        );
    }
}

#[test]
fn test_canonical_lines_hold_normalized_components() {
    let canonical = Canonicalizer::default().build(
        "GET",
        "/a%20b/c",
        "z=1&a=two+words&flag",
        EMPTY_BODY_SHA256,
    );
    let lines: Vec<&str> = canonical.split('\n').collect();

    assert_eq!(
        lines,
        vec!["GET", "/a%20b/c", "a=two%20words&flag=&z=1", EMPTY_BODY_SHA256]
    );
}
