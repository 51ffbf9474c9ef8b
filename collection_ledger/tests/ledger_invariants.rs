use collection_ledger::ledger::{self, BulkAllocationItem};
use collection_ledger::{containers, database, inventory, ContainerKind, NewCard, Section};
use rusqlite::Connection;

fn assert_supply(conn: &Connection) {
    let violations = ledger::verify_supply(conn).unwrap();
    assert!(violations.is_empty(), "supply violated: {:?}", violations);
}

/// Sum of owned plus wishlist copies across every container
fn total_demand(conn: &Connection) -> u32 {
    containers::list_containers(conn)
        .unwrap()
        .iter()
        .map(|c| c.stats.total)
        .sum()
}

fn deck(conn: &Connection, name: &str) -> i64 {
    containers::create_container(
        conn,
        name,
        &ContainerKind::Deck {
            format: Some("modern".to_string()),
            commander: None,
        },
    )
    .unwrap()
}

#[test]
fn supply_holds_through_a_mixed_session() {
    let mut conn = database::open_in_memory().unwrap();
    let burn = deck(&conn, "Burn");
    let control = deck(&conn, "Control");
    let binder = containers::create_container(&conn, "Trade binder", &ContainerKind::Binder).unwrap();

    let bolt = inventory::insert_card(&conn, &NewCard::collection("Lightning Bolt", "M10", 4)).unwrap();
    let counter = inventory::insert_card(&conn, &NewCard::collection("Counterspell", "7ED", 3)).unwrap();
    let negate = inventory::insert_card(&conn, &NewCard::collection("Negate", "M20", 1)).unwrap();

    ledger::allocate(&mut conn, burn, bolt, 4, Section::Mainboard).unwrap();
    assert_supply(&conn);
    let short = ledger::allocate(&mut conn, control, bolt, 2, Section::Sideboard).unwrap();
    assert_eq!((short.allocated, short.wishlisted), (0, 2));
    assert_supply(&conn);

    let report = ledger::bulk_allocate(
        &mut conn,
        control,
        &[
            BulkAllocationItem {
                card_id: counter,
                section: Section::Mainboard,
                quantity: 3,
            },
            BulkAllocationItem {
                card_id: negate,
                section: Section::Sideboard,
                quantity: 2,
            },
        ],
        |_, _| {},
    )
    .unwrap();
    assert_eq!(report.allocated, 4);
    assert_eq!(report.wishlisted, 1);
    assert_supply(&conn);

    let update = ledger::update_allocation(&mut conn, burn, bolt, Section::Mainboard, 6).unwrap();
    assert!(update.clamped);
    assert_eq!(update.quantity, 4);
    assert_supply(&conn);

    ledger::reduce_allocations_for_card(&mut conn, counter, 1).unwrap();
    assert_supply(&conn);
    ledger::allocate(&mut conn, binder, counter, 1, Section::Mainboard).unwrap();
    assert_supply(&conn);

    let before = total_demand(&conn);
    ledger::convert_allocations_to_wishlist(&mut conn, bolt).unwrap();
    assert_supply(&conn);
    assert_eq!(total_demand(&conn), before);

    ledger::retire_card(&mut conn, negate, None).unwrap();
    assert_supply(&conn);
    assert_eq!(total_demand(&conn), before);

    assert!(ledger::deallocate(&mut conn, control, counter, Section::Mainboard).unwrap());
    assert_supply(&conn);
}

#[test]
fn reducing_owned_two_to_one_leaves_one_allocated() {
    let mut conn = database::open_in_memory().unwrap();
    let burn = deck(&conn, "Burn");
    let bolt = inventory::insert_card(&conn, &NewCard::collection("Lightning Bolt", "M10", 2)).unwrap();
    ledger::allocate(&mut conn, burn, bolt, 2, Section::Mainboard).unwrap();

    ledger::reduce_allocations_for_card(&mut conn, bolt, 1).unwrap();

    let allocations = containers::allocations_for_container(&conn, burn).unwrap();
    assert_eq!(allocations.len(), 1);
    assert_eq!(allocations[0].quantity, 1);
    assert_eq!(inventory::require_card(&conn, bolt).unwrap().quantity, 1);
    assert_supply(&conn);
}

#[test]
fn repeated_bulk_allocation_does_not_double() {
    let mut conn = database::open_in_memory().unwrap();
    let burn = deck(&conn, "Burn");
    let shock = inventory::insert_card(&conn, &NewCard::collection("Shock", "M19", 4)).unwrap();
    let items = [BulkAllocationItem {
        card_id: shock,
        section: Section::Mainboard,
        quantity: 3,
    }];

    ledger::bulk_allocate(&mut conn, burn, &items, |_, _| {}).unwrap();
    ledger::bulk_allocate(&mut conn, burn, &items, |_, _| {}).unwrap();

    assert_eq!(inventory::allocated_total(&conn, shock).unwrap(), 3);
    assert_eq!(ledger::available_quantity(&conn, shock).unwrap(), 1);
    assert_supply(&conn);
}
