//! Synthetic images from the level populations of a grid.
//!
//! Every pixel is an independent sight-line: it is followed cell by cell through
//! the mesh and the transfer equation is integrated from the observer inwards,
//! with vertex data interpolated linearly inside each cell.

use anyhow::{Context, Result, bail, ensure};
use ndarray as nd;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::geom::bboxes::bounding_radius;
use crate::geom::mesh::Cell;
use crate::geom::ray::Ray;
use crate::geom::rotation::{rotate_vector, view_rotation};
use crate::sim::constants::{MAXP, MIN_TAU};
use crate::sim::dust::dust_coefficients;
use crate::sim::fastexp::fast_exp;
use crate::sim::grid::Grid;
use crate::sim::radiation::{Emissivity, calc_source_fn, gaussline, planck};
use crate::{LineError, Point, Vector};

use super::config::{ImageConfig, ImageKind};
use super::image::Image;
use super::walk::{Segment, follow};

/// Upper limit on the velocity sub-steps of one segment.
const MAX_SUBSTEPS: usize = 10000;

pub struct RayTracer {
    /// Worker threads, zero lets rayon decide.
    pub num_threads: usize,
    /// Optical depth below which the source-function remnant uses its series.
    pub taylor_cutoff: f64,
}

impl RayTracer {
    pub fn new() -> Self {
        Self {
            num_threads: 0,
            taylor_cutoff: 0.66,
        }
    }

    /// Traces all `configs` in order, each one parallel over pixels.
    pub fn trace(&self, grid: &Grid, configs: &[ImageConfig]) -> Result<Vec<Image>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.num_threads)
            .build()
            .context("Failed to build worker pool")?;
        configs
            .iter()
            .enumerate()
            .map(|(i, config)| {
                pool.install(|| self.trace_image(grid, config, i))
                    .with_context(|| format!("Failed to trace image {i}"))
            })
            .collect()
    }

    /// Traces a single image on the current rayon pool. `index` only labels errors and logs.
    pub fn trace_image(&self, grid: &Grid, config: &ImageConfig, index: usize) -> Result<Image> {
        ensure!(
            config.pxls > 0 && config.antialias > 0,
            LineError::InvalidInput("image needs at least one pixel and one sight-line".into())
        );
        let (freq, lines, background) = traced_lines(grid, config)?;
        let mesh = grid.mesh();
        if mesh.cells().is_empty() {
            bail!(LineError::NoCellsEntered { image: index });
        }

        let rot = view_rotation(config.theta, config.phi).context("Invalid viewing angles")?;
        let sources = vertex_states(grid, config, &lines, &rot.view());
        let positions: Vec<Point> = mesh.vertices().iter().map(|v| v.position).collect();
        let radius = bounding_radius(&positions);
        let ctx = ImageTracer {
            grid,
            config,
            lines: &lines,
            sources: &sources,
            external: mesh.external_faces(),
            velocities: config.channel_velocities(),
            origin_offset: 1.01 * radius + config.pixel_size(),
            rot: &rot,
            background,
            taylor_cutoff: self.taylor_cutoff,
        };

        let npix = config.pxls * config.pxls;
        let pixels: Vec<PixelResult> = (0..npix).into_par_iter().map(|p| ctx.pixel(p)).collect();

        let mut image = Image::new(config.clone(), freq);
        let mut entered = false;
        for (p, px) in pixels.into_iter().enumerate() {
            let (ix, iy) = (p % config.pxls, p / config.pxls);
            entered |= px.entered;
            image.discarded += px.discarded;
            for (ch, (i, t)) in px.intensity.iter().zip(&px.tau).enumerate() {
                image.intensity[(ix, iy, ch)] = *i;
                image.tau[(ix, iy, ch)] = *t;
            }
            if let Some(stokes) = image.stokes.as_mut() {
                for (k, s) in px.stokes.iter().enumerate() {
                    stokes[(ix, iy, k)] = *s;
                }
            }
        }
        if !entered {
            bail!(LineError::NoCellsEntered { image: index });
        }

        info!(
            image = index,
            pixels = npix,
            channels = config.nchan(),
            blends = lines.len().saturating_sub(1),
            discarded = image.discarded,
            "image traced"
        );
        Ok(image)
    }
}

impl Default for RayTracer {
    fn default() -> Self {
        Self::new()
    }
}

/// The imaged transition or one of its blends.
#[derive(Debug, Clone, Copy)]
struct TracedLine {
    species: usize,
    line: usize,
    delta_v: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct LineState {
    binv: f64,
    n_u: f64,
    n_l: f64,
}

/// Everything the transfer equation needs at one point of a sight-line.
#[derive(Debug, Clone)]
struct LocalState {
    velocity: Vector,
    /// Magnetic field in the image frame.
    b_field: Vector,
    knu: f64,
    dust: f64,
    /// Aligned with the traced lines.
    lines: Vec<LineState>,
}

impl LocalState {
    /// Weighted sum of states; weights are expected to sum to one.
    fn mix<'a>(parts: impl IntoIterator<Item = (&'a LocalState, f64)>, nlines: usize) -> Self {
        let mut out = LocalState {
            velocity: Vector::zero(),
            b_field: Vector::zero(),
            knu: 0.,
            dust: 0.,
            lines: vec![LineState::default(); nlines],
        };
        for (s, w) in parts {
            if w <= 0. {
                continue;
            }
            out.velocity = out.velocity + s.velocity * w;
            out.b_field = out.b_field + s.b_field * w;
            out.knu += w * s.knu;
            out.dust += w * s.dust;
            for (o, l) in out.lines.iter_mut().zip(&s.lines) {
                o.binv += w * l.binv;
                o.n_u += w * l.n_u;
                o.n_l += w * l.n_l;
            }
        }
        out
    }
}

/// Accumulated result of one pixel.
struct PixelResult {
    intensity: Vec<f64>,
    tau: Vec<f64>,
    stokes: [f64; 3],
    entered: bool,
    discarded: usize,
}

impl PixelResult {
    fn zeros(nchan: usize) -> Self {
        Self {
            intensity: vec![0.; nchan],
            tau: vec![0.; nchan],
            stokes: [0.; 3],
            entered: false,
            discarded: 0,
        }
    }

    fn add(&mut self, other: &PixelResult) {
        self.intensity.iter_mut().zip(&other.intensity).for_each(|(a, b)| *a += b);
        self.tau.iter_mut().zip(&other.tau).for_each(|(a, b)| *a += b);
        self.stokes.iter_mut().zip(&other.stokes).for_each(|(a, b)| *a += b);
        self.entered |= other.entered;
    }

    fn scale(&mut self, f: f64) {
        self.intensity.iter_mut().for_each(|a| *a *= f);
        self.tau.iter_mut().for_each(|a| *a *= f);
        self.stokes.iter_mut().for_each(|a| *a *= f);
    }
}

/// Shared read-only state while tracing one image.
struct ImageTracer<'a> {
    grid: &'a Grid,
    config: &'a ImageConfig,
    lines: &'a [TracedLine],
    sources: &'a [LocalState],
    external: Vec<(usize, usize)>,
    velocities: Vec<f64>,
    /// Distance of the sight-line origins from the image plane through the model origin.
    origin_offset: f64,
    rot: &'a nd::Array2<f64>,
    background: f64,
    taylor_cutoff: f64,
}

impl ImageTracer<'_> {
    fn pixel(&self, p: usize) -> PixelResult {
        let config = self.config;
        let size = config.pixel_size();
        let centre = |i: usize| (i as f64 + 0.5 - config.pxls as f64 / 2.) * size;
        let (x0, y0) = (centre(p % config.pxls), centre(p / config.pxls));
        let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(p as u64));

        let mut acc = PixelResult::zeros(config.nchan());
        let mut used = 0;
        for _ in 0..config.antialias {
            let (dx, dy) = if config.antialias > 1 {
                (
                    rng.gen_range(-0.5..0.5) * size,
                    rng.gen_range(-0.5..0.5) * size,
                )
            } else {
                (0., 0.)
            };
            match self.sight_line(x0 + dx, y0 + dy) {
                Ok(result) => {
                    acc.add(&result);
                    used += 1;
                }
                Err(err) => {
                    debug!(pixel = p, "sight-line discarded: {err}");
                    acc.discarded += 1;
                }
            }
        }
        if used > 0 {
            acc.scale(1. / used as f64);
        }
        acc
    }

    /// Integrates one sight-line through image-plane position `(x, y)`.
    fn sight_line(&self, x: f64, y: f64) -> Result<PixelResult, LineError> {
        let rot = self.rot.view();
        let origin = rotate_vector(&rot, Vector::new(x, y, self.origin_offset));
        let dir = rotate_vector(&rot, Vector::new(0., 0., -1.));
        let ray = Ray::new(Point::new(origin.dx, origin.dy, origin.dz), dir)
            .ok_or_else(|| LineError::RayTraceDegenerate("zero viewing direction".into()))?;

        let segments = follow(self.grid.mesh(), &ray, &self.external, self.config.face_eps)?;
        let mut result = PixelResult::zeros(self.config.nchan());
        if segments.is_empty() {
            return Ok(result);
        }
        result.entered = true;
        for seg in &segments {
            self.integrate_segment(&ray, seg, &mut result);
        }

        let bg = self.background;
        for (i, tau) in result.intensity.iter_mut().zip(&result.tau) {
            *i += (fast_exp(*tau) - 1.) * bg;
        }
        if self.config.polarization {
            result.stokes[0] += (fast_exp(result.tau[0]) - 1.) * bg;
        }
        Ok(result)
    }

    fn state_at(&self, cell: &Cell, w: &[f64; 4]) -> LocalState {
        LocalState::mix(
            cell.vertices.iter().zip(w).map(|(&v, &wi)| (&self.sources[v], wi)),
            self.lines.len(),
        )
    }

    /// Number of steps keeping the line-of-sight velocity change per step
    /// below half a Doppler width.
    fn substeps(&self, dir: Vector, a: &LocalState, b: &LocalState) -> usize {
        let binv = a
            .lines
            .iter()
            .chain(&b.lines)
            .map(|l| l.binv)
            .fold(0., f64::max);
        let dv = (b.velocity - a.velocity).dot(dir).abs();
        ((2. * dv * binv).ceil() as usize).clamp(1, MAX_SUBSTEPS)
    }

    fn integrate_segment(&self, ray: &Ray, seg: &Segment, out: &mut PixelResult) {
        let mols = self.grid.mols();
        let cell = self.grid.mesh().cell(seg.cell);
        let a = self.state_at(cell, &seg.w_in);
        let b = self.state_at(cell, &seg.w_out);
        let n = self.substeps(ray.direction, &a, &b);
        let ds = (seg.d_out - seg.d_in) / n as f64;

        for k in 0..n {
            let f = (k as f64 + 0.5) / n as f64;
            let st = LocalState::mix([(&a, 1. - f), (&b, f)], self.lines.len());
            let v_los = st.velocity.dot(ray.direction);

            for (ch, v_ch) in self.velocities.iter().enumerate() {
                let mut e = Emissivity::default();
                for (tl, ls) in self.lines.iter().zip(&st.lines) {
                    let v = v_ch + tl.delta_v - self.config.source_vel - v_los;
                    let line = &mols[tl.species].lines[tl.line];
                    e.add_line_densities(line, gaussline(v, ls.binv), ls.binv, ls.n_u, ls.n_l);
                }
                e.add_continuum(st.knu, st.dust);

                let dtau = (e.alpha * ds).max(MIN_TAU);
                let (remnant, _) = calc_source_fn(dtau, self.taylor_cutoff);
                let attenuation = fast_exp(out.tau[ch]);
                out.intensity[ch] += attenuation * remnant * e.jnu * ds;
                if self.config.polarization {
                    let j = stokes_emissivity(st.dust * st.knu, st.b_field);
                    for (s, js) in out.stokes.iter_mut().zip(j) {
                        *s += attenuation * remnant * js * ds;
                    }
                }
                out.tau[ch] = (out.tau[ch] + dtau).max(MIN_TAU);
            }
        }
    }
}

/// Stokes I, Q and U emissivities of aligned dust grains.
///
/// `b` is the magnetic field in the image frame; without a field the emission
/// is unpolarized.
fn stokes_emissivity(jnu: f64, b: Vector) -> [f64; 3] {
    let b2 = b.dot(b);
    if !(b2 > 0.) {
        return [jnu, 0., 0.];
    }
    let bp2 = b.dx * b.dx + b.dy * b.dy;
    let cos2_gamma = bp2 / b2;
    let i = jnu * (1. - MAXP * (cos2_gamma - 2. / 3.));
    if !(bp2 > 0.) {
        return [i, 0., 0.];
    }
    let q = jnu * MAXP * cos2_gamma * (b.dy * b.dy - b.dx * b.dx) / bp2;
    let u = jnu * MAXP * cos2_gamma * (-2. * b.dx * b.dy) / bp2;
    [i, q, u]
}

/// Frequency, contributing lines and background intensity of an image.
fn traced_lines(grid: &Grid, config: &ImageConfig) -> Result<(f64, Vec<TracedLine>, f64)> {
    match config.kind {
        ImageKind::Line {
            species,
            line,
            nchan,
            velres,
        } => {
            let mol = grid.mols().get(species).ok_or_else(|| {
                LineError::InvalidInput(format!("species {species} does not exist"))
            })?;
            let transition = mol.lines.get(line).ok_or_else(|| {
                LineError::InvalidInput(format!("{} has no line {line}", mol.name))
            })?;
            ensure!(
                nchan > 0 && velres > 0.,
                LineError::InvalidInput("line image needs channels of positive width".into())
            );
            ensure!(
                !config.polarization,
                LineError::InvalidInput("polarization is only traced for continuum images".into())
            );
            let mut lines = vec![TracedLine {
                species,
                line,
                delta_v: 0.,
            }];
            lines.extend(grid.blends().of(species, line).iter().map(|b| TracedLine {
                species: b.species,
                line: b.line,
                delta_v: b.delta_v,
            }));
            Ok((transition.freq, lines, mol.background[line]))
        }
        ImageKind::Continuum { freq } => {
            ensure!(
                freq > 0.,
                LineError::InvalidInput(format!("continuum frequency {freq} is not positive"))
            );
            Ok((freq, Vec::new(), planck(freq, grid.config().tcmb)))
        }
    }
}

/// Per-vertex sources of one image.
fn vertex_states(
    grid: &Grid,
    config: &ImageConfig,
    lines: &[TracedLine],
    rot: &nd::ArrayView2<f64>,
) -> Vec<LocalState> {
    let to_image = rot.t();
    grid.points()
        .par_iter()
        .map(|p| {
            let (knu, dust) = match config.kind {
                ImageKind::Line { species, line, .. } => {
                    (p.mol[species].knu[line], p.mol[species].dust[line])
                }
                ImageKind::Continuum { freq } => dust_coefficients(
                    grid.config().dust.as_ref(),
                    freq,
                    p.temperature[1],
                    p.gas_to_dust,
                    p.density.iter().sum(),
                ),
            };
            let lines = lines
                .iter()
                .map(|tl| {
                    let pop = &p.mol[tl.species];
                    let line = &grid.mols()[tl.species].lines[tl.line];
                    LineState {
                        binv: pop.binv,
                        n_u: pop.nmol * pop.pops[line.upper],
                        n_l: pop.nmol * pop.pops[line.lower],
                    }
                })
                .collect();
            LocalState {
                velocity: p.velocity,
                b_field: rotate_vector(&to_image, p.b_field),
                knu,
                dust,
                lines,
            }
        })
        .collect()
}
