/**
 * ARTEMIS DASHBOARD - Supervision temps réel d'une flotte de devices
 *
 * RÔLE : Suit les devices annoncés par le serveur de télémétrie (position,
 * orientation, présence), les projette sur une carte et lève une alerte
 * avec compte à rebours quand l'un d'eux est perdu.
 *
 * FLUX : mqtt → dashboard (ingest, alert, view) → watch<DashboardView> → http
 */

pub mod alert;
pub mod auth;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod health;
pub mod http;
pub mod ingest;
pub mod models;
pub mod mqtt;
pub mod registry;
pub mod view;
