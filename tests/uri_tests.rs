//! Table-driven URI parse, canonicalization and local-path round-trip
//! checks.

use proptest::prelude::*;
use uniquefile::uri::ResourceUri;

#[test]
fn parse_and_restring_canonical_uris() {
    let cases = [
        (
            "file:opaque.txt",
            ResourceUri {
                scheme: "file".into(),
                hostname: "".into(),
                path: "opaque.txt".into(),
                query: "".into(),
            },
        ),
        (
            "file://server/share/file.txt",
            ResourceUri {
                scheme: "file".into(),
                hostname: "server".into(),
                path: "/share/file.txt".into(),
                query: "".into(),
            },
        ),
    ];
    for (source, expect) in cases {
        let uri: ResourceUri = source.parse().unwrap();
        assert_eq!(uri, expect, "parsing {source:?}");
        assert_eq!(uri.to_string(), source, "re-stringing {source:?}");
    }
}

#[test]
fn windows_paths_round_trip_through_uris() {
    let cases = [
        ("file:///C:/Users/Sean/Downloads", r"C:\Users\Sean\Downloads"),
        (
            "file://skillian-pc.paperless/C:/Users/Sean/Downloads",
            r"\\skillian-pc.paperless\C$\Users\Sean\Downloads",
        ),
    ];
    for (source, windows_path) in cases {
        let uri: ResourceUri = source.parse().unwrap();
        assert_eq!(uri.windows_path(), windows_path, "path of {source:?}");
        let back = ResourceUri::from_windows_path(windows_path);
        assert_eq!(back, uri, "round trip of {windows_path:?}");
    }
}

fn arb_path_segment() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9._-]{1,12}"
}

proptest! {
    /// Canonical POSIX file URIs survive a string round trip.
    #[test]
    fn posix_uri_string_round_trip(segments in prop::collection::vec(arb_path_segment(), 1..6)) {
        let path = format!("/{}", segments.join("/"));
        let uri = ResourceUri::from_posix_path(&path);
        let canonical = uri.to_string();
        let reparsed: ResourceUri = canonical.parse().unwrap();
        prop_assert_eq!(&reparsed, &uri);
        prop_assert_eq!(reparsed.to_string(), canonical);
    }

    /// Canonical Windows drive paths survive the URI round trip, with
    /// and without a hostname.
    #[test]
    fn windows_path_round_trip(
        drive in "[A-Z]",
        segments in prop::collection::vec(arb_path_segment(), 1..5),
        hostname in prop::option::of("[a-z][a-z0-9-]{0,10}"),
    ) {
        let (prefix, share) = match &hostname {
            Some(host) => (format!(r"\\{host}\"), format!("{drive}$")),
            None => (String::new(), format!("{drive}:")),
        };
        let path = format!(r"{prefix}{share}\{}", segments.join(r"\"));
        let uri = ResourceUri::from_windows_path(&path);
        prop_assert_eq!(uri.windows_path(), path);
    }
}
