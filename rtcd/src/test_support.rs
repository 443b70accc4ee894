//! Shared fixtures for the daemon's unit tests.

use rtc_common::{
    CategoryErrorIndex, CredentialSet, FaultOverviewScanner, HostAvailabilityRegistry, MockShare,
    RemoteFileClient, RtcConfig, ScanSettings,
};

pub const HOST: &str = "masch1";
pub const SYSTEM_LOG: &str = r"\\masch1\c$\Testsystem\Log\system.log";
pub const VERSION_DIR: &str = r"\\fileserver\ergebnis\Basis\03-2024\LF24.1.0\masch1";
pub const CATEGORY: &str = "Kategorie_A";

pub fn config() -> RtcConfig {
    let mut config = RtcConfig::default();
    config.scan.modules = vec!["Basis".into(), "Export".into()];
    config
}

pub fn overview_path() -> String {
    format!(r"{VERSION_DIR}\{CATEGORY}\uebersicht.txt")
}

/// Share with a resolvable system log and one category overview.
pub fn host_share(overview: &str) -> MockShare {
    let mut log: Vec<String> = (1..=7).map(|n| format!("Zeile {n}")).collect();
    log.push(format!(r"Installiert: {VERSION_DIR}\"));
    MockShare::new()
        .with_file(SYSTEM_LOG, log.join("\r\n"))
        .with_file(&overview_path(), overview)
}

pub fn client(share: &MockShare) -> RemoteFileClient<MockShare> {
    RemoteFileClient::new(
        share.clone(),
        HostAvailabilityRegistry::new(),
        CredentialSet::default(),
    )
}

pub fn scanner(share: &MockShare) -> FaultOverviewScanner<MockShare> {
    scanner_with(client(share))
}

pub fn scanner_with(client: RemoteFileClient<MockShare>) -> FaultOverviewScanner<MockShare> {
    FaultOverviewScanner::new(
        client,
        ScanSettings::from_config(&config()).expect("default scan settings"),
        CategoryErrorIndex::new(),
    )
}
