//! Crossfade transition.
//!
//! The `b` weight follows the transition's progress, or ramps from `start`
//! to `end` when `start` is set. Images are blended byte for byte; audio is
//! mixed with a per-sample ramp up to the next frame's weight.

use rayon::prelude::*;
use tracing::warn;

use strata_core::{
    Context, Frame, Image, ImageRequest, Position, Result, StrataError, Transition,
    TransitionImpl,
};

pub struct MixTransition;

impl MixTransition {
    pub fn create(ctx: &Context, arg: Option<&str>) -> Result<Transition> {
        let transition = Transition::new(ctx, MixTransition);
        if let Some(start) = arg {
            transition.set("start", start)?;
        }
        Ok(transition)
    }

    fn level_at(transition: &Transition, position: Position) -> f64 {
        let progress = transition.progress_at(position);
        if !transition.exists("start") {
            return progress;
        }
        let start = transition.get_double("start");
        let end = if transition.exists("end") {
            transition.get_double("end")
        } else {
            start
        };
        (start + (end - start) * progress).clamp(0.0, 1.0)
    }
}

impl TransitionImpl for MixTransition {
    fn process(&self, transition: &Transition, a: Frame, b: Frame) -> Result<Frame> {
        let position = a.position();
        let mix = Self::level_at(transition, position);
        let mix_next = Self::level_at(transition, position + 1);
        a.set_double("mix", mix)?;

        let b_audio = b.clone();
        a.push_frame(b);
        a.push_get_image(|frame, request| {
            let b = frame
                .pop_frame()
                .ok_or_else(|| StrataError::Image("mix lost its b frame".into()))?;
            let mut image = frame.get_image(request.writable())?;
            let other = b.get_image(ImageRequest::new(image.format(), image.width(), image.height()))?;
            blend(&mut image, &other, frame.get_double("mix"))?;
            Ok(image)
        });
        a.push_get_audio(move |frame, request| {
            frame.mix_audio(&b_audio, mix as f32, mix_next as f32, request)
        });
        Ok(a)
    }
}

/// Blend `other` into `image` with weight `mix`. Images of different
/// layouts are left as they are.
pub fn blend(image: &mut Image, other: &Image, mix: f64) -> Result<()> {
    if image.format() != other.format()
        || image.width() != other.width()
        || image.height() != other.height()
    {
        warn!(
            a = %image.format(),
            b = %other.format(),
            "cannot blend images of different layouts"
        );
        return Ok(());
    }
    let mix = mix.clamp(0.0, 1.0) as f32;
    let stride = image.stride().max(1);
    let data = image.data_mut()?;
    data.par_chunks_mut(stride)
        .zip(other.data().par_chunks(stride))
        .for_each(|(row, src)| {
            for (d, s) in row.iter_mut().zip(src) {
                *d = (*d as f32 * (1.0 - mix) + *s as f32 * mix).round() as u8;
            }
        });
    Ok(())
}
