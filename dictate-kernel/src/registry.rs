/**
 * REGISTRE DES ENDPOINTS - Table en mémoire des contrôleurs LED connus
 *
 * RÔLE : Résolution d'un identifiant (MAC, insensible à la casse) vers son
 * endpoint, et remplacement exclusif du dictat courant.
 *
 * FONCTIONNEMENT :
 * - Clés fixées au démarrage depuis la config, jamais modifiées ensuite
 * - Un verrou par endpoint : dictat, forme sérialisée et paramètres filaires
 *   changent ensemble, un lecteur ne voit jamais une paire mélangée
 * - Pas de verrou global, deux endpoints différents ne se bloquent pas
 */

use crate::codec::{uniform_step, CodecError, WireParams};
use crate::config::EndpointConf;
use crate::models::{now_nanos, Dictate, Location, Step, WHITE};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Dictate has no steps")]
    EmptyDictate,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Duplicate endpoint id: {0}")]
    DuplicateEndpoint(String),
    #[error(transparent)]
    Build(#[from] CodecError),
}

struct EndpointState {
    params: WireParams,
    dictate: Dictate,
    // JSON renvoyé tel quel sur GET /status
    serialized: String,
}

/// Vue cohérente d'un endpoint, prise sous un seul verrou
#[derive(Debug, Clone)]
pub struct EndpointSnapshot {
    pub params: WireParams,
    pub ts: i64,
    pub serialized: String,
}

pub struct Endpoint {
    id: String,
    name: String,
    location: Location,
    state: Mutex<EndpointState>,
}

impl Endpoint {
    fn new(conf: &EndpointConf, initial_ts: i64) -> Result<Self, RegistryError> {
        let dictate = Dictate {
            ts: initial_ts,
            steps: vec![uniform_step(WHITE, 1, conf.leds)?],
        };
        let serialized = serde_json::to_string(&dictate)?;
        Ok(Self {
            id: conf.id.to_lowercase(),
            name: conf.name.clone(),
            location: conf.location,
            state: Mutex::new(EndpointState {
                params: WireParams { leds: conf.leds, step_len_ms: conf.step_len_ms },
                dictate,
                serialized,
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn wire_params(&self) -> WireParams {
        self.state.lock().params
    }

    /// Vaut pour les prochaines constructions de séquences uniquement
    pub fn set_wire_parameters(&self, leds: usize, step_len_ms: u32) {
        self.state.lock().params = WireParams { leds, step_len_ms };
    }

    /// Remplace le dictat courant. `ts` absent = maintenant.
    /// En cas d'échec le dictat précédent reste en place.
    pub fn apply_dictate(&self, steps: Vec<Step>, ts: Option<i64>) -> Result<i64, RegistryError> {
        let dictate = Dictate { ts: ts.unwrap_or_else(now_nanos), steps };
        let mut state = self.state.lock();
        commit(&mut state, dictate)
    }

    /// Vérification d'âge et remplacement sous le même verrou : une écriture
    /// concurrente plus récente n'est jamais écrasée par le rafraîchisseur
    pub fn refresh_if_idle<F>(&self, now: i64, idle: Duration, build: F) -> Result<bool, RegistryError>
    where
        F: FnOnce(WireParams) -> Result<Vec<Step>, CodecError>,
    {
        let mut state = self.state.lock();
        let age = now.saturating_sub(state.dictate.ts);
        let stale = u128::try_from(age).is_ok_and(|age| age > idle.as_nanos());
        if !stale {
            return Ok(false);
        }
        let dictate = Dictate { ts: now, steps: build(state.params)? };
        commit(&mut state, dictate)?;
        Ok(true)
    }

    pub fn last_update(&self) -> i64 {
        self.state.lock().dictate.ts
    }

    /// Lecture GET /status : le contrôleur rapporte son câblage,
    /// on l'enregistre et on renvoie le dictat sous le même verrou
    pub fn report_status(&self, leds: usize, step_len_ms: u32) -> String {
        let mut state = self.state.lock();
        state.params = WireParams { leds, step_len_ms };
        state.serialized.clone()
    }

    pub fn dictate(&self) -> Dictate {
        self.state.lock().dictate.clone()
    }

    pub fn snapshot(&self) -> EndpointSnapshot {
        let state = self.state.lock();
        EndpointSnapshot {
            params: state.params,
            ts: state.dictate.ts,
            serialized: state.serialized.clone(),
        }
    }
}

fn commit(state: &mut EndpointState, dictate: Dictate) -> Result<i64, RegistryError> {
    if dictate.steps.is_empty() {
        return Err(RegistryError::EmptyDictate);
    }
    state.serialized = serde_json::to_string(&dictate)?;
    let ts = dictate.ts;
    state.dictate = dictate;
    Ok(ts)
}

pub struct Registry {
    endpoints: BTreeMap<String, Endpoint>, // MAC minuscule -> Endpoint
}

impl Registry {
    /// Construit la table une fois pour toutes ; chaque endpoint démarre
    /// en blanc pleine intensité horodaté `initial_ts`
    pub fn from_config(confs: &[EndpointConf], initial_ts: i64) -> Result<Self, RegistryError> {
        let mut endpoints = BTreeMap::new();
        for conf in confs {
            let endpoint = Endpoint::new(conf, initial_ts)?;
            if endpoints.contains_key(endpoint.id()) {
                return Err(RegistryError::DuplicateEndpoint(endpoint.id));
            }
            endpoints.insert(endpoint.id.clone(), endpoint);
        }
        Ok(Self { endpoints })
    }

    pub fn resolve(&self, raw_id: &str) -> Option<&Endpoint> {
        self.endpoints.get(&raw_id.to_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.values()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }
}
