//! Integration tests for the registration message schema.
//!
//! The audio server parses the `REGISTER` object with a fixed key order, so
//! these tests pin the exact bytes produced through the public API.

use std::net::Ipv4Addr;

use aoip_core::{
    decode_control_message, encode_registration, AoipSupport, ControlMessage, DeviceCapabilities,
    LivewireSupport, SUPPORTED_SAMPLE_RATE,
};

fn capabilities(aoip_support: AoipSupport) -> DeviceCapabilities {
    DeviceCapabilities::new(
        Ipv4Addr::new(192, 168, 1, 10),
        32,
        vec![SUPPORTED_SAMPLE_RATE],
        "UCYNCU-Device",
        aoip_support,
    )
}

#[test]
fn test_registration_matches_exact_wire_form() {
    // Arrange
    let caps = capabilities(AoipSupport {
        aes67: true,
        dante: false,
        livewire: LivewireSupport::enabled_with("XXXX-XXXX-XXXX-XXXX"),
    });

    // Act
    let bytes = encode_registration(&caps).expect("encode must succeed");

    // Assert
    assert_eq!(
        String::from_utf8(bytes).unwrap(),
        concat!(
            r#"{"type":"REGISTER","device_type":"DEVICE","ip_address":"192.168.1.10","#,
            r#""max_channels":32,"audio_format":"WAV","supported_sample_rates":[48000],"#,
            r#""device_name":"UCYNCU-Device","aoip_support":{"aes67":true,"dante":false,"#,
            r#""livewire":{"enabled":true,"license_key":"XXXX-XXXX-XXXX-XXXX"}}}"#
        )
    );
}

#[test]
fn test_registration_with_livewire_disabled_has_empty_key() {
    let caps = capabilities(AoipSupport {
        aes67: false,
        dante: true,
        livewire: LivewireSupport::default(),
    });

    let text = String::from_utf8(encode_registration(&caps).unwrap()).unwrap();

    assert!(text.ends_with(
        r#""aoip_support":{"aes67":false,"dante":true,"livewire":{"enabled":false,"license_key":""}}}"#
    ));
}

#[test]
fn test_registration_baseline_profile_reports_24_channels() {
    let mut caps = capabilities(AoipSupport::default());
    caps.max_channels = 24;

    let text = String::from_utf8(encode_registration(&caps).unwrap()).unwrap();

    assert!(text.contains(r#""max_channels":24,"#));
}

#[test]
fn test_registration_decodes_as_register_variant() {
    let caps = capabilities(AoipSupport::default());
    let bytes = encode_registration(&caps).unwrap();

    let decoded = decode_control_message(&bytes).expect("decode must succeed");

    assert_eq!(decoded, ControlMessage::Register(caps));
}
