use keyprov_gpg::{parse_keygrip, parse_keygrips};

// Colon listing for one secret key with an encryption subkey, as produced
// by `gpg --batch --with-colons --with-keygrip --list-secret-keys`.
const LISTING: &str = "\
sec:u:4096:1:7D851EB72D73BDA0:1587145471:::u:::scESC:::+::23::0:
fpr:::::::::27571A53B86AF0C799B38BA77D851EB72D73BDA0:
grp:::::::::3E2D1142AA59E08E16B7E2C64BA6DDC773B1A627:
uid:u::::1587145471::5D58AACCB9A8C05C0D4429514185F6B47C3A4B5E::Joe Tester <joe@foo.bar>::::::::::0:
ssb:u:4096:1:D523BD50DD70B0BA:1587145471::::::e:::+::23:
fpr:::::::::5A282E1460C0BC419615D34DD523BD50DD70B0BA:
grp:::::::::BA83FC8947213477F28ADC019F6564A956456163:
";

const PRIMARY_FPR: &str = "27571A53B86AF0C799B38BA77D851EB72D73BDA0";
const SUBKEY_FPR: &str = "5A282E1460C0BC419615D34DD523BD50DD70B0BA";
const PRIMARY_GRIP: &str = "3E2D1142AA59E08E16B7E2C64BA6DDC773B1A627";
const SUBKEY_GRIP: &str = "BA83FC8947213477F28ADC019F6564A956456163";

#[test]
fn all_grips_under_primary_fingerprint_in_listing_order() {
    let grips = parse_keygrips(LISTING, PRIMARY_FPR);
    assert_eq!(grips, vec![PRIMARY_GRIP.to_string(), SUBKEY_GRIP.to_string()]);
}

#[test]
fn subkey_fingerprint_resolves_that_records_grip() {
    // Scoped per fpr record: the subkey fingerprint must yield the subkey
    // grip, not the first grip in the file.
    assert_eq!(
        parse_keygrip(LISTING, SUBKEY_FPR),
        Some(SUBKEY_GRIP.to_string())
    );
    assert_eq!(
        parse_keygrip(LISTING, PRIMARY_FPR),
        Some(PRIMARY_GRIP.to_string())
    );
}

#[test]
fn unknown_fingerprint_yields_nothing() {
    let unknown = "0000000000000000000000000000000000000000";
    assert!(parse_keygrips(LISTING, unknown).is_empty());
    assert_eq!(parse_keygrip(LISTING, unknown), None);
}

#[test]
fn two_subkey_listing_keeps_tool_order() {
    let listing = "\
sec:u:255:22:AAAA111122223333:1600000000:::u:::scESC:::+::ed25519::0:
fpr:::::::::1111111111111111111111111111111111111111:
grp:::::::::AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA:
uid:u::::1600000000::X::Joe Tester <joe@foo.bar>::::::::::0:
ssb:u:255:18:BBBB111122223333:1600000000::::::e:::+::cv25519:
fpr:::::::::2222222222222222222222222222222222222222:
grp:::::::::BBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB:
ssb:u:255:22:CCCC111122223333:1600000000::::::s:::+::ed25519:
fpr:::::::::3333333333333333333333333333333333333333:
grp:::::::::CCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCC:
";
    let grips = parse_keygrips(listing, "1111111111111111111111111111111111111111");
    assert_eq!(
        grips,
        vec![
            "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA".to_string(),
            "BBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB".to_string(),
            "CCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCC".to_string(),
        ]
    );
}

#[test]
fn another_keys_block_does_not_leak_grips() {
    let listing = "\
sec:u:255:22:AAAA111122223333:1600000000:::u:::scESC:::+::ed25519::0:
fpr:::::::::1111111111111111111111111111111111111111:
grp:::::::::AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA:
ssb:u:255:18:BBBB111122223333:1600000000::::::e:::+::cv25519:
fpr:::::::::2222222222222222222222222222222222222222:
grp:::::::::BBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB:
sec:u:255:22:DDDD111122223333:1600000000:::u:::scESC:::+::ed25519::0:
fpr:::::::::4444444444444444444444444444444444444444:
grp:::::::::DDDDDDDDDDDDDDDDDDDDDDDDDDDDDDDDDDDDDDDD:
";
    let grips = parse_keygrips(listing, "1111111111111111111111111111111111111111");
    assert_eq!(
        grips,
        vec![
            "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA".to_string(),
            "BBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB".to_string(),
        ]
    );

    let grips = parse_keygrips(listing, "4444444444444444444444444444444444444444");
    assert_eq!(
        grips,
        vec!["DDDDDDDDDDDDDDDDDDDDDDDDDDDDDDDDDDDDDDDD".to_string()]
    );
}
