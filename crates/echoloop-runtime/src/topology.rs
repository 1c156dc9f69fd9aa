//! Static topology — engines, links, triads, and the dispatch table
//!
//! Pure data, no behavior. Engines get evenly spaced phase offsets over the
//! 12-step cycle; every unordered engine pair gets exactly one link; triads
//! are the 3-element engine subsets in lexicographic order, one active per
//! phase. Cross-references are arena indices, never pointers.

use echoloop_core::{
    EngineId, Error, LinkId, Phase, Result, Specialization, TriadId, CYCLE_LENGTH,
};

/// Construction-time description of one engine.
#[derive(Debug, Clone)]
pub struct EngineSeed {
    pub id: EngineId,
    pub specialization: Specialization,
    pub phase_offset: u32,
}

/// One undirected engine pair.
#[derive(Debug, Clone, Copy)]
pub struct LinkSpec {
    pub id: LinkId,
    pub a: EngineId,
    pub b: EngineId,
}

/// A 3-engine grouping with an orientation tag in degrees.
#[derive(Debug, Clone)]
pub struct Triad {
    pub id: TriadId,
    pub engines: [EngineId; 3],
    pub orientation: f64,
}

#[derive(Debug, Clone)]
pub struct Topology {
    engines: Vec<EngineSeed>,
    links: Vec<LinkSpec>,
    triads: Vec<Triad>,
    /// Active engines per step, indexed by `step - 1`.
    dispatch: Vec<Vec<EngineId>>,
}

impl Topology {
    /// Build the complete topology for `n` engines.
    ///
    /// Deterministic and side-effect free. Fails for n < 2 (no cross-engine
    /// coupling to schedule) and for n that does not divide the cycle length
    /// (offsets could not be evenly spaced).
    pub fn build(n: usize) -> Result<Self> {
        if n < 2 {
            return Err(Error::invalid_topology(format!(
                "need at least 2 engines, got {}",
                n
            )));
        }
        if CYCLE_LENGTH as usize % n != 0 {
            return Err(Error::invalid_topology(format!(
                "{} engines do not divide the {}-step cycle",
                n, CYCLE_LENGTH
            )));
        }

        let span = CYCLE_LENGTH / n as u32;

        let engines: Vec<EngineSeed> = (0..n)
            .map(|i| EngineSeed {
                id: EngineId(i),
                specialization: Specialization::for_index(i),
                phase_offset: i as u32 * span,
            })
            .collect();

        let mut links = Vec::with_capacity(n * (n - 1) / 2);
        for a in 0..n {
            for b in (a + 1)..n {
                links.push(LinkSpec {
                    id: LinkId(links.len()),
                    a: EngineId(a),
                    b: EngineId(b),
                });
            }
        }

        // Lexicographic 3-combinations. For n = 4 these are the four faces of
        // the tetrahedron; for n = 3 the single whole-set triad.
        let mut triads = Vec::new();
        for a in 0..n {
            for b in (a + 1)..n {
                for c in (b + 1)..n {
                    triads.push(Triad {
                        id: TriadId(triads.len()),
                        engines: [EngineId(a), EngineId(b), EngineId(c)],
                        orientation: 0.0,
                    });
                }
            }
        }
        let count = triads.len().max(1);
        for (i, triad) in triads.iter_mut().enumerate() {
            triad.orientation = i as f64 * 360.0 / count as f64;
        }

        let dispatch = (1..=CYCLE_LENGTH)
            .map(|step| {
                engines
                    .iter()
                    .filter(|e| step_triad(e.id.0 as u32, span).contains(&step))
                    .map(|e| e.id)
                    .collect()
            })
            .collect();

        Ok(Self {
            engines,
            links,
            triads,
            dispatch,
        })
    }

    pub fn engine_count(&self) -> usize {
        self.engines.len()
    }

    pub fn engines(&self) -> &[EngineSeed] {
        &self.engines
    }

    pub fn links(&self) -> &[LinkSpec] {
        &self.links
    }

    pub fn triads(&self) -> &[Triad] {
        &self.triads
    }

    /// The step triad assigned to an engine.
    pub fn step_triad_of(&self, engine: EngineId) -> Result<[u32; 3]> {
        if engine.0 >= self.engines.len() {
            return Err(Error::UnknownEngine(engine));
        }
        let span = CYCLE_LENGTH / self.engines.len() as u32;
        Ok(step_triad(engine.0 as u32, span))
    }

    /// Engines active at a step. Deterministic and stable; a step outside
    /// [1, 12] reduces mod 12 first.
    pub fn engine_set_for(&self, step: u32) -> &[EngineId] {
        let idx = ((step.max(1) - 1) % CYCLE_LENGTH) as usize;
        &self.dispatch[idx]
    }

    /// The triad active at a step: one per phase, rotating through the table.
    /// None when the topology has no triads (n = 2).
    pub fn active_triad(&self, step: u32) -> Option<TriadId> {
        if self.triads.is_empty() {
            return None;
        }
        let idx = Phase::for_step(step).index() % self.triads.len();
        Some(TriadId(idx))
    }

    /// Link covering an unordered engine pair.
    pub fn link_between(&self, a: EngineId, b: EngineId) -> Option<LinkId> {
        self.links
            .iter()
            .find(|l| (l.a == a && l.b == b) || (l.a == b && l.b == a))
            .map(|l| l.id)
    }
}

/// Step triad for engine slot `i`: `{i+1, i+1+span, i+1+2·span}` reduced into
/// [1, 12]. With three engines (span 4) this is the classic
/// {1,5,9} / {2,6,10} / {3,7,11} assignment.
fn step_triad(slot: u32, span: u32) -> [u32; 3] {
    let wrap = |s: u32| ((s - 1) % CYCLE_LENGTH) + 1;
    [
        wrap(slot + 1),
        wrap(slot + 1 + span),
        wrap(slot + 1 + 2 * span),
    ]
}
