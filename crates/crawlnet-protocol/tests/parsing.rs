//! Property tests: the parsers must survive arbitrary input.
//!
//! Every byte a peer sends reaches `PacketFactory::parse` and, for
//! `INFO_REPLY`, `GameAnnouncement::decode`. Neither may panic; both must
//! either produce a value or a `PacketError`.

use crawlnet_protocol::{
    Address, GameAnnouncement, GameData, INFO_HEADER_SIZE, PacketBody, PacketFactory, PlayerSlot,
    Turn,
};
use proptest::prelude::*;

proptest! {
    #[test]
    fn prop_parse_never_panics(data in prop::collection::vec(any::<u8>(), 0..512)) {
        let factory = PacketFactory::new();
        let _ = factory.parse(&data);
    }

    #[test]
    fn prop_parse_sealed_never_panics(data in prop::collection::vec(any::<u8>(), 0..512)) {
        let mut factory = PacketFactory::new();
        factory.set_password("pw");
        let _ = factory.parse(&data);
    }

    #[test]
    fn prop_announcement_decode_never_panics(data in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = GameAnnouncement::decode(&data);
    }

    #[test]
    fn prop_announcement_name_is_tail(name in "[a-z0-9 ]{0,40}", seed in any::<u32>()) {
        let data = GameData { seed, ..GameData::default() };
        let payload = GameAnnouncement::encode(&data.to_bytes(), &["host", "", "", ""], &name);
        prop_assert_eq!(payload.len(), INFO_HEADER_SIZE + name.len());

        let decoded = GameAnnouncement::decode(&payload).unwrap();
        prop_assert_eq!(decoded.game_name, name);
        prop_assert_eq!(decoded.game_data.seed, seed);
    }

    #[test]
    fn prop_bit_flip_in_sealed_frame_is_rejected(
        payload in prop::collection::vec(any::<u8>(), 1..64),
        flip in any::<prop::sample::Index>(),
    ) {
        let mut factory = PacketFactory::new();
        factory.set_password("pw");
        let packet = factory
            .make_packet(
                PlayerSlot::HOST,
                Address::Broadcast,
                PacketBody::Turn { turn: Turn { seq: 1, data: payload } },
            )
            .unwrap();

        let mut frame = packet.data().to_vec();
        let i = flip.index(frame.len());
        frame[i] ^= 0x01;
        prop_assert!(factory.parse(&frame).is_err());
    }
}

#[test]
fn test_parse_plaintext_frame_with_password_set_fails() {
    let plain = PacketFactory::new();
    let packet = plain
        .make_packet(Address::Master, Address::Broadcast, PacketBody::InfoRequest)
        .unwrap();

    let mut sealed = PacketFactory::new();
    sealed.set_password("pw");
    assert!(sealed.parse(packet.data()).is_err());
}

#[test]
fn test_parse_sealed_frame_without_password_fails() {
    let mut sealed = PacketFactory::new();
    sealed.set_password("pw");
    let packet = sealed
        .make_packet(Address::Master, Address::Broadcast, PacketBody::InfoRequest)
        .unwrap();

    assert!(PacketFactory::new().parse(packet.data()).is_err());
}
