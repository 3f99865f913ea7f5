//! Property tests for the envelope codec and signing contract.

use proptest::prelude::*;
use swarmproto::{
    CorrelationId, Ed25519Signer, Envelope, MAX_ENVELOPE_SIZE, PING_REQUEST, PING_RESPONSE,
    Signer, decode, encode_signed, encode_unsigned, peek_protocol_id, sign_envelope,
    verify_envelope,
};

fn correlation_id() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..64)
}

fn payload() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..2048)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_signed_envelope_recovers_payload_and_id(id in correlation_id(), body in payload()) {
        let signer = Ed25519Signer::generate();
        let mut envelope =
            Envelope::request(PING_REQUEST, CorrelationId::from(id.clone()), body.clone());
        let wire = sign_envelope(&signer, &mut envelope).expect("sign");

        let decoded = decode(&wire).expect("decode");
        prop_assert_eq!(decoded.correlation_id().as_bytes(), &id[..]);
        prop_assert_eq!(&decoded.payload[..], &body[..]);
        prop_assert!(!decoded.is_response());
        prop_assert!(verify_envelope(&signer, &decoded, &signer.public_key()).expect("verify"));
        prop_assert_eq!(peek_protocol_id(&wire).expect("peek"), PING_REQUEST);
    }

    #[test]
    fn test_response_echoes_correlation_id(id in correlation_id(), body in payload()) {
        let requester = Ed25519Signer::generate();
        let responder = Ed25519Signer::generate();

        let mut request = Envelope::request(PING_REQUEST, CorrelationId::from(id), body);
        let wire = sign_envelope(&requester, &mut request).expect("sign");
        let received = decode(&wire).expect("decode");

        let mut response =
            Envelope::response_to(&received, PING_RESPONSE, received.payload.clone());
        let wire = sign_envelope(&responder, &mut response).expect("sign");
        let decoded = decode(&wire).expect("decode");

        prop_assert!(decoded.is_response());
        prop_assert_eq!(decoded.correlation_id(), request.correlation_id());
        let verified = verify_envelope(&requester, &decoded, &responder.public_key());
        prop_assert!(verified.expect("verify"));
    }

    #[test]
    fn test_unsigned_form_is_independent_of_signature(id in correlation_id(), body in payload()) {
        let signer = Ed25519Signer::generate();
        let mut envelope = Envelope::request(PING_REQUEST, CorrelationId::from(id), body);
        let before = encode_unsigned(&envelope).expect("encode");
        sign_envelope(&signer, &mut envelope).expect("sign");
        prop_assert_eq!(encode_unsigned(&envelope).expect("encode"), before);
    }

    #[test]
    fn test_decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        if let Ok(envelope) = decode(&bytes) {
            prop_assert_eq!(encode_signed(&envelope).expect("encode"), bytes);
        }
    }

    #[test]
    fn test_flipped_byte_never_verifies(body in payload(), index in any::<prop::sample::Index>()) {
        let signer = Ed25519Signer::generate();
        let mut envelope =
            Envelope::request(PING_REQUEST, CorrelationId::from(vec![1, 2, 3]), body);
        let mut wire = sign_envelope(&signer, &mut envelope).expect("sign");

        let at = index.index(wire.len());
        wire[at] ^= 0x01;
        if let Ok(decoded) = decode(&wire) {
            let verified = verify_envelope(&signer, &decoded, &signer.public_key());
            prop_assert!(!verified.unwrap_or(false));
        }
    }
}

#[test]
fn test_oversize_payload_rejected() {
    let signer = Ed25519Signer::generate();
    let mut envelope = Envelope::request(
        PING_REQUEST,
        CorrelationId::from(vec![1]),
        vec![0u8; MAX_ENVELOPE_SIZE],
    );
    assert!(sign_envelope(&signer, &mut envelope).is_err());
}
