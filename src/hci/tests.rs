use bytes::Bytes;
use matches::assert_matches;

use crate::dev::{Addr, AddrKind, RawAddr};

use super::*;

fn addr() -> RawAddr {
    RawAddr::from_le_bytes([0xFF, 0xEE, 0xDD, 0xCC, 0xBB, 0xAA])
}

#[test]
fn event_header() {
    let pkt = [EventCode::InquiryComplete as u8, 1, 4];
    let e = Event::try_from(pkt.as_ref()).unwrap();
    assert_eq!(e.typ(), EventType::Hci(EventCode::InquiryComplete));
    assert_eq!(e.status(), Status::PageTimeout);
    assert_eq!(e.conn_handle(), None);
    assert!(e.is_valid());
}

#[test]
fn event_le_header() {
    let pkt = [EventCode::LeMetaEvent as u8, 2, 0x02, 1];
    let e = Event::try_from(pkt.as_ref()).unwrap();
    assert_eq!(e.typ(), EventType::Le(SubeventCode::AdvertisingReport));
    assert_eq!(e.status(), Status::Success);
}

#[test]
fn event_cmd_complete() {
    let pkt = [EventCode::CommandComplete as u8, 4, 1, 0x05, 0x04, 0x0C];
    let e = Event::try_from(pkt.as_ref()).unwrap();
    assert_eq!(e.opcode(), Opcode::CreateConnection);
    assert_eq!(e.status(), Status::CommandDisallowed);

    // Completion that only updates the command quota
    let pkt = [EventCode::CommandComplete as u8, 3, 1, 0x00, 0x00];
    let e = Event::try_from(pkt.as_ref()).unwrap();
    assert_eq!(e.opcode(), Opcode::None);
    assert_eq!(e.status(), Status::Success);
}

#[test]
fn event_cmd_status() {
    let pkt = [EventCode::CommandStatus as u8, 4, 0x0C, 1, 0x06, 0x04];
    let e = Event::try_from(pkt.as_ref()).unwrap();
    assert_eq!(e.opcode(), Opcode::Disconnect);
    assert_eq!(e.status(), Status::CommandDisallowed);
}

#[test]
fn event_error() {
    let event = |b: &[u8]| Event::try_from(b).unwrap_err();
    assert_matches!(event(&[]), Error::InvalidEvent(_));
    assert_matches!(
        event(&[EventCode::InquiryComplete as u8, 1]),
        Error::InvalidEvent(_)
    );
    assert_matches!(
        event(&[0, 1, 2]),
        Error::UnknownEvent {
            code: 0,
            subevent: 0,
            ..
        }
    );
    assert_matches!(
        event(&[EventCode::LeMetaEvent as u8, 1, 0xFF]),
        Error::UnknownEvent {
            code: 0x3E,
            subevent: 0xFF,
            ..
        }
    );
}

#[test]
fn connection_complete() {
    let mut pkt = vec![EventCode::ConnectionComplete as u8, 11, 0x00, 0x40, 0x00];
    pkt.extend_from_slice(addr().as_ref());
    pkt.extend_from_slice(&[0x01, 0x00]);
    let mut e = Event::try_from(pkt.as_slice()).unwrap();
    let cc = ConnectionComplete::from(&mut e);
    assert!(e.is_valid());
    assert_eq!(cc.status, Status::Success);
    assert_eq!(cc.handle, ConnHandle::new(0x40));
    assert_eq!(cc.addr, addr());
    assert_eq!(cc.link_type, LinkType::Acl);
    assert!(!cc.encryption_enabled);
}

#[test]
fn disconnection_complete() {
    let pkt = [EventCode::DisconnectionComplete as u8, 4, 0x00, 0x40, 0x00, 0x13];
    let mut e = Event::try_from(pkt.as_ref()).unwrap();
    let dc = DisconnectionComplete::from(&mut e);
    assert!(e.is_valid());
    assert_eq!(dc.reason, Status::RemoteUserTerminatedConnection);
}

#[test]
fn le_connection_complete() {
    let mut pkt = vec![EventCode::LeMetaEvent as u8, 19, 0x01, 0x00, 0x41, 0x00, 0x01, 0x00];
    pkt.extend_from_slice(addr().as_ref());
    pkt.extend_from_slice(&[0x18, 0x00, 0x00, 0x00, 0xF4, 0x01, 0x00]);
    let mut e = Event::try_from(pkt.as_slice()).unwrap();
    let cc = LeConnectionComplete::from(&mut e);
    assert!(e.is_valid());
    assert_eq!(cc.role, Role::Peripheral);
    assert_eq!(cc.peer_addr, Addr::public(addr()));
    assert_eq!(cc.reporting_addr(), Addr::public(addr()));
}

#[test]
fn le_enhanced_connection_complete_rpa() {
    let rpa = RawAddr::from_le_bytes([0x66, 0x55, 0x44, 0x33, 0x22, 0x11]);
    let mut pkt = vec![EventCode::LeMetaEvent as u8, 31, 0x0A, 0x00, 0x41, 0x00, 0x00, 0x00];
    pkt.extend_from_slice(addr().as_ref());
    pkt.extend_from_slice(RawAddr::default().as_ref()); // local RPA
    pkt.extend_from_slice(rpa.as_ref()); // peer RPA
    pkt.extend_from_slice(&[0x18, 0x00, 0x00, 0x00, 0xF4, 0x01, 0x00]);
    let mut e = Event::try_from(pkt.as_slice()).unwrap();
    let cc = LeConnectionComplete::from(&mut e);
    assert!(e.is_valid());
    assert_eq!(cc.role, Role::Central);
    assert_eq!(cc.reporting_addr(), Addr::random(rpa));
    assert_eq!(cc.reporting_addr().kind, AddrKind::Random);
}

#[test]
fn short_event_params() {
    // DisconnectionComplete missing the reason byte
    let pkt = [EventCode::DisconnectionComplete as u8, 3, 0x00, 0x40, 0x00];
    let mut e = Event::try_from(pkt.as_ref()).unwrap();
    let _ = DisconnectionComplete::from(&mut e);
    assert!(!e.is_valid());
}

#[test]
fn acl_packet() {
    let payload = [0x04, 0x00, 0x01, 0x00, 0xAA, 0xBB, 0xCC, 0xDD];
    let raw = AclPacket::build(
        ConnHandle::new(0x40).unwrap(),
        PacketBoundaryFlag::FirstAutomaticallyFlushable,
        &payload,
    );
    assert_eq!(raw.as_ref()[..4], [0x40, 0x20, 0x08, 0x00]);
    let pkt = AclPacket::parse(&raw).unwrap();
    assert_eq!(pkt.handle(), ConnHandle::new(0x40).unwrap());
    assert_eq!(
        pkt.boundary(),
        PacketBoundaryFlag::FirstAutomaticallyFlushable
    );
    assert_eq!(pkt.payload().as_ref(), payload);
    assert_eq!(l2cap_pdu_len(pkt.payload()), Some(4));
}

#[test]
fn acl_packet_error() {
    let parse = |b: &[u8]| AclPacket::parse(&Bytes::copy_from_slice(b)).unwrap_err();
    assert_matches!(parse(&[]), Error::InvalidAcl(_));
    // Length mismatch
    assert_matches!(parse(&[0x40, 0x20, 0x02, 0x00, 0xAA]), Error::InvalidAcl(_));
    // Out-of-range handle
    assert_matches!(parse(&[0xFF, 0x2F, 0x01, 0x00, 0xAA]), Error::InvalidAcl(_));
}

#[test]
fn opcode_groups() {
    assert_eq!(u16::from(Opcode::CreateConnection), 0x0405);
    assert_eq!(u16::from(Opcode::RoleDiscovery), 0x0809);
    assert_eq!(u16::from(Opcode::ReadRssi), 0x1405);
    assert_eq!(u16::from(Opcode::LeExtendedCreateConnection), 0x2043);
}

#[test]
fn command_params() {
    let cmd = Command::create_connection(
        addr(),
        PacketType::default(),
        PageScanRepetitionMode::R1,
        0,
        ClockOffsetValid::Invalid,
        RoleSwitch::Allowed,
    );
    assert_eq!(cmd.opcode(), Opcode::CreateConnection);
    let raw = cmd.as_ref();
    assert_eq!(raw[..3], [0x05, 0x04, 13]);
    assert_eq!(&raw[3..9], addr().as_ref());
    // DM/DH 1/3/5
    assert_eq!(u16::from(raw[9]) | u16::from(raw[10]) << 8, 0xCC18);
}

#[test]
fn le_command_params() {
    let peer = Addr {
        kind: AddrKind::RandomIdentity,
        raw: addr(),
    };
    let cmd = Command::le_extended_create_connection(peer, &LeConnParams::default());
    let mut p = cmd.params();
    assert_eq!(p.u8(), 0x00); // Filter policy
    assert_eq!(p.u8(), 0x01); // Own address type
    assert_eq!(p.u8(), 0x03); // Peer address type
    p.skip(6).unwrap();
    assert_eq!(p.u8(), 0x01); // 1M PHY
    assert_eq!(p.u16(), 0x0060); // Scan interval
}
