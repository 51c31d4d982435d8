use scribehook::domain::AudioFormat;

#[test]
fn given_mime_with_parameters_when_parsing_then_essence_is_matched() {
    assert_eq!(
        AudioFormat::from_mime("audio/ogg; codecs=opus"),
        Some(AudioFormat::Ogg)
    );
    assert_eq!(AudioFormat::from_mime("AUDIO/MPEG"), Some(AudioFormat::Mp3));
}

#[test]
fn given_common_aliases_when_parsing_then_they_map_to_formats() {
    assert_eq!(AudioFormat::from_mime("audio/x-wav"), Some(AudioFormat::Wav));
    assert_eq!(AudioFormat::from_mime("audio/x-m4a"), Some(AudioFormat::M4a));
    assert_eq!(AudioFormat::from_mime("audio/x-flac"), Some(AudioFormat::Flac));
}

#[test]
fn given_non_audio_mime_when_parsing_then_returns_none() {
    assert_eq!(AudioFormat::from_mime("text/plain"), None);
    assert_eq!(AudioFormat::from_mime("video/mp4"), None);
}

#[test]
fn given_declared_content_type_when_resolving_then_it_wins_over_extension() {
    assert_eq!(
        AudioFormat::resolve(Some("audio/flac"), "memo.wav"),
        Some(AudioFormat::Flac)
    );
    assert_eq!(AudioFormat::resolve(Some("text/plain"), "memo.wav"), None);
}

#[test]
fn given_missing_or_generic_content_type_when_resolving_then_extension_is_used() {
    assert_eq!(AudioFormat::resolve(None, "memo.M4A"), Some(AudioFormat::M4a));
    assert_eq!(AudioFormat::resolve(Some(""), "memo.ogg"), Some(AudioFormat::Ogg));
    assert_eq!(
        AudioFormat::resolve(Some("application/octet-stream"), "memo.mp3"),
        Some(AudioFormat::Mp3)
    );
    assert_eq!(AudioFormat::resolve(None, "memo"), None);
}

#[test]
fn given_every_format_when_round_tripping_canonical_names_then_format_is_preserved() {
    for format in AudioFormat::ALL {
        assert_eq!(AudioFormat::from_extension(format.extension()), Some(format));
        assert_eq!(AudioFormat::from_mime(format.as_mime()), Some(format));
    }
}
