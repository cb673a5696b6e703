/**
 * RAFRAÎCHISSEUR IDLE - Aucun contrôleur ne garde un dictat périmé
 *
 * RÔLE : Tâche de fond qui scanne le registre à intervalle fixe et pousse
 * une couleur aléatoire de la palette sur tout endpoint dont le dictat est
 * plus vieux que la fenêtre d'inactivité.
 *
 * Un échec sur un endpoint est loggé et n'interrompt pas le scan des autres.
 */

use crate::codec::uniform_step;
use crate::models::now_nanos;
use crate::palette::Palette;
use crate::registry::{Endpoint, Registry, RegistryError};
use rand::Rng;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// Dictat aléatoire mono-étape, chemin commun à /update/basic et au scan.
/// Retourne le nom de la couleur tirée.
pub fn apply_random_dictate<'p, R: Rng + ?Sized>(
    endpoint: &Endpoint,
    palette: &'p Palette,
    rng: &mut R,
    ts: Option<i64>,
) -> Result<&'p str, RegistryError> {
    let (name, rgb) = palette.pick(rng);
    let leds = endpoint.wire_params().leds;
    endpoint.apply_dictate(vec![uniform_step(rgb, 1, leds)?], ts)?;
    Ok(name)
}

/// Un passage de scan ; retourne le nombre d'endpoints rafraîchis
pub fn refresh_stale<R: Rng + ?Sized>(
    registry: &Registry,
    palette: &Palette,
    rng: &mut R,
    idle: Duration,
    now: i64,
) -> usize {
    let mut refreshed = 0;
    for endpoint in registry.iter() {
        let (name, rgb) = palette.pick(rng);
        match endpoint.refresh_if_idle(now, idle, |p| Ok(vec![uniform_step(rgb, 1, p.leds)?])) {
            Ok(true) => {
                info!("idle refresh {} ({}) -> {}", endpoint.name(), endpoint.id(), name);
                refreshed += 1;
            }
            Ok(false) => {}
            Err(e) => error!("failed to refresh {} ({}): {}", endpoint.name(), endpoint.id(), e),
        }
    }
    refreshed
}

pub fn spawn_idle_refresher(
    registry: Arc<Registry>,
    palette: Arc<Palette>,
    idle: Duration,
    scan_every: Duration,
) -> JoinHandle<()> {
    info!("starting idle refresher (window: {}s, scan: {}ms)", idle.as_secs(), scan_every.as_millis());

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(scan_every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // un scan qui panique est loggé, la boucle continue
        loop {
            interval.tick().await;
            let scan = std::panic::catch_unwind(AssertUnwindSafe(|| {
                refresh_stale(&registry, &palette, &mut rand::thread_rng(), idle, now_nanos())
            }));
            if scan.is_err() {
                error!("idle refresh scan panicked, retrying next tick");
            }
        }
    })
}
