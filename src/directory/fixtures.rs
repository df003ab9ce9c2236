//! Seed data for the in-memory directory
//!
//! Used by the demo binary, the API server when no database is configured,
//! and tests.

use crate::auth::pin::hash_pin;
use crate::directory::InMemoryDirectory;
use crate::models::{CardRecord, TransactionRecord, UserRecord};

/// PIN assigned to every seeded card
pub const DEMO_PIN: &str = "1234";

pub fn user(client_id: &str, handles: &[&str]) -> UserRecord {
    UserRecord {
        client_id: client_id.to_string(),
        handles: handles.iter().map(|h| h.to_string()).collect(),
        first_name: "Demo".to_string(),
        last_name: format!("Client {}", client_id),
    }
}

pub fn card(client_id: &str, card_number: &str) -> CardRecord {
    CardRecord {
        card_token: format!("?A{}", card_number),
        client_id: client_id.to_string(),
        card_number: card_number.to_string(),
        card_type: "DEBIT".to_string(),
        product_type: "CLASSIC".to_string(),
        currency: "840".to_string(),
        status: "A".to_string(),
        expiry_date: "31122027".to_string(),
        available_balance: 1500.75,
        current_balance: 1800.50,
        card_limit: 2000.0,
        cashback: 10.5,
        pin_hash: hash_pin(DEMO_PIN).unwrap_or_default(),
    }
}

pub fn transaction(date: &str, amount: &str) -> TransactionRecord {
    TransactionRecord {
        date: date.to_string(),
        time: "120000".to_string(),
        amount: amount.to_string(),
        currency: "840".to_string(),
        transaction_type: "10".to_string(),
        description: "PURCHASE - POS".to_string(),
        terminal_location: "FSB CORE".to_string(),
        reference_number: format!("REF{}{}", date, amount.replace('.', "")),
        status: "Posted".to_string(),
    }
}

fn described(date: &str, amount: &str, description: &str, location: &str) -> TransactionRecord {
    TransactionRecord {
        description: description.to_string(),
        terminal_location: location.to_string(),
        ..transaction(date, amount)
    }
}

/// Two demo clients: one with a single card, one with two cards.
pub fn seed_demo_directory() -> InMemoryDirectory {
    let users = vec![
        UserRecord {
            client_id: "1001".to_string(),
            handles: vec!["U01SAMER".to_string(), "web:1001".to_string()],
            first_name: "Samer".to_string(),
            last_name: "K.".to_string(),
        },
        UserRecord {
            client_id: "1002".to_string(),
            handles: vec!["U02MOHAMED".to_string(), "web:1002".to_string()],
            first_name: "Mohamed".to_string(),
            last_name: "M.".to_string(),
        },
    ];

    let samer_card = card("1001", "5000214044289662");
    let samer_txns = vec![
        described("28102025", "25.50", "PURCHASE - POS", "Beirut Mall"),
        described("27102025", "100.00", "PURCHASE - POS", "ABC Dbayeh"),
        described("26102025", "15.99", "PURCHASE - ECOM", "Online - Amazon"),
        described("20102025", "42.10", "PURCHASE - POS", "Spinneys Achrafieh"),
        described("15102025", "5.00", "MEMO-CREDIT ADJUSTMENT", "FSB CORE"),
    ];

    let mohamed_usd = card("1002", "5000987612345678");
    let mohamed_eur = CardRecord {
        currency: "978".to_string(),
        product_type: "GOLD".to_string(),
        card_type: "CREDIT".to_string(),
        ..card("1002", "5000555566667777")
    };

    InMemoryDirectory::from_records(
        users,
        vec![
            (samer_card, samer_txns),
            (
                mohamed_usd,
                vec![described("03112025", "60.00", "PURCHASE - ECOM", "Online - Netflix")],
            ),
            (
                mohamed_eur,
                vec![described("01112025", "12.00", "PURCHASE - POS", "Paris Cafe")],
            ),
        ],
    )
}
