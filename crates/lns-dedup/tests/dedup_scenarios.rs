//! End-to-end deduplication scenarios
//!
//! Frames flow parser -> key derivation -> cache classification, the way the
//! uplink dispatcher drives them. Stations use the fixture EUIs
//! 11:11:... and 22:22:... throughout.

use lns_core::device::{DeduplicationMode, Device};
use lns_core::frame::{DataFrame, JoinRequestFrame, UplinkRequest};
use lns_core::identifiers::{DevAddr, DevEui, DevNonce, JoinEui, Mic, StationEui};
use lns_dedup::{ConcentratorDeduplication, ConcentratorDeduplicationResult};

fn station_one() -> StationEui {
    "11:11:11:11:11:11:11:11".parse().unwrap()
}

fn station_two() -> StationEui {
    "22:22:22:22:22:22:22:22".parse().unwrap()
}

fn data_uplink(station: StationEui) -> UplinkRequest {
    UplinkRequest::new(
        station,
        DataFrame::new(DevEui(0), DevAddr(0), 0, Mic(0)),
    )
}

fn join_uplink(station: StationEui) -> UplinkRequest {
    UplinkRequest::new(
        station,
        JoinRequestFrame::new(JoinEui(0), DevEui(0), DevNonce(0), Mic(0)),
    )
}

#[test]
fn data_resubmission_from_the_same_station() {
    let dedup = ConcentratorDeduplication::new();
    let device = Device::new(DevEui(0));

    assert_eq!(
        dedup
            .check_duplicate_data(&data_uplink(station_one()), &device)
            .unwrap(),
        ConcentratorDeduplicationResult::NotDuplicate
    );
    assert_eq!(
        dedup
            .check_duplicate_data(&data_uplink(station_one()), &device)
            .unwrap(),
        ConcentratorDeduplicationResult::DuplicateDueToResubmission
    );
    assert_eq!(dedup.len(), 1);
}

#[test]
fn data_cross_station_dropped_under_drop_mode() {
    let dedup = ConcentratorDeduplication::new();
    let device = Device::new(DevEui(0)).with_deduplication(DeduplicationMode::Drop);

    dedup
        .check_duplicate_data(&data_uplink(station_one()), &device)
        .unwrap();
    assert_eq!(
        dedup
            .check_duplicate_data(&data_uplink(station_two()), &device)
            .unwrap(),
        ConcentratorDeduplicationResult::Duplicate
    );

    // the first concentrator remains authoritative for the window
    let key = lns_dedup::MessageKey::for_data(&data_uplink(station_one()).frame).unwrap();
    assert_eq!(dedup.first_station(&key), Some(station_one()));
}

#[test]
fn data_cross_station_soft_under_mark_and_none() {
    for mode in [DeduplicationMode::Mark, DeduplicationMode::None] {
        let dedup = ConcentratorDeduplication::new();
        let device = Device::new(DevEui(0)).with_deduplication(mode);

        dedup
            .check_duplicate_data(&data_uplink(station_one()), &device)
            .unwrap();
        assert_eq!(
            dedup
                .check_duplicate_data(&data_uplink(station_two()), &device)
                .unwrap(),
            ConcentratorDeduplicationResult::SoftDuplicateDueToDeduplicationStrategy
        );
    }
}

#[test]
fn join_repeats_are_always_duplicates() {
    let dedup = ConcentratorDeduplication::new();

    assert_eq!(
        dedup.check_duplicate_join(&join_uplink(station_one())).unwrap(),
        ConcentratorDeduplicationResult::NotDuplicate
    );
    for station in [station_one(), station_two()] {
        assert_eq!(
            dedup.check_duplicate_join(&join_uplink(station)).unwrap(),
            ConcentratorDeduplicationResult::Duplicate
        );
    }
    assert_eq!(dedup.len(), 1);
}

#[test]
fn data_and_join_streams_do_not_interfere() {
    let dedup = ConcentratorDeduplication::new();
    let device = Device::new(DevEui(0));

    assert_eq!(
        dedup
            .check_duplicate_data(&data_uplink(station_one()), &device)
            .unwrap(),
        ConcentratorDeduplicationResult::NotDuplicate
    );
    // same DevEui, but a join keys independently of the data uplink
    assert_eq!(
        dedup.check_duplicate_join(&join_uplink(station_one())).unwrap(),
        ConcentratorDeduplicationResult::NotDuplicate
    );
    assert_eq!(dedup.len(), 2);
}
