/*!
# Parking Live DevKit - Stubs et utilitaires de test

Bibliothèque pour tester une session de tableau de bord sans serveur ni broker :
- Broker push simulé et transport associé
- Source pull scriptée avec compteurs d'appels
- Vue d'enregistrement pour les assertions
- Harness qui câble le tout
*/

pub mod pull_stub;
pub mod push_stub;
pub mod recording_view;
pub mod test_utils;

pub use pull_stub::{Endpoint, PutReply, StubPullSource};
pub use push_stub::{MockBroker, MockPushTransport, ParkingMessageBuilder};
pub use recording_view::RecordingView;
pub use test_utils::{event, TestHarness};
