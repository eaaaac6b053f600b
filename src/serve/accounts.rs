/// A client account allowed to pull from the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Identifier sent in the `Authorization` header.
    pub id: u32,
    /// Database name under the service prefix.
    pub name: String,
}

/// Account lookup table.
#[derive(Debug, Clone, Default)]
pub struct Accounts {
    entries: Vec<Account>,
}

impl Accounts {
    /// Accounts built into the server.
    pub fn builtin() -> Self {
        Self::new(vec![
            Account {
                id: 1,
                name: "sandbox".into(),
            },
            Account {
                id: 2,
                name: "demo".into(),
            },
        ])
    }

    /// Table holding exactly `entries`.
    pub fn new(entries: Vec<Account>) -> Self {
        Self { entries }
    }

    /// Finds the account with `id`.
    pub fn lookup(&self, id: u32) -> Option<&Account> {
        self.entries.iter().find(|account| account.id == id)
    }
}
