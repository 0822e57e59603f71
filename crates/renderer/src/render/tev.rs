//! Mapping of canonical combiners onto the PICA texture environment (TEV).
//!
//! Every channel equation becomes one or more TEV operations. Each TEV stage has a single
//! constant color register, so an operation reading two different constants has one of them
//! loaded by an extra stage first.

use std::fmt;

use easyerr::Error;
use pica64::system::combiner::{
    Channel, CombinerFeatures, CombinerFlags, Input, InputMapping, Operand, Shape,
};

/// Stages the PICA texture environment has.
pub const MAX_STAGES: usize = 6;
/// Alpha test reference used for texture edges.
pub const TEXTURE_EDGE_REFERENCE: u8 = 0x80;

/// Where a TEV argument reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Vertex,
    Texture0,
    Texture1,
    Constant,
    Previous,
}

/// Which part of a source a TEV argument reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    Color,
    Alpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Arg {
    pub source: Source,
    pub component: Component,
}

impl Arg {
    const PREVIOUS_COLOR: Self = Self {
        source: Source::Previous,
        component: Component::Color,
    };

    const PREVIOUS_ALPHA: Self = Self {
        source: Source::Previous,
        component: Component::Alpha,
    };
}

/// A TEV combine operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Replace(Arg),
    Modulate(Arg, Arg),
    /// `a * c + b * (1 - c)`
    Interpolate(Arg, Arg, Arg),
    Subtract(Arg, Arg),
    /// `a * b + c`
    MultiplyAdd(Arg, Arg, Arg),
}

impl Op {
    fn args(&self) -> impl Iterator<Item = Arg> {
        let (args, len) = match *self {
            Self::Replace(a) => ([a, a, a], 1),
            Self::Modulate(a, b) | Self::Subtract(a, b) => ([a, b, b], 2),
            Self::Interpolate(a, b, c) | Self::MultiplyAdd(a, b, c) => ([a, b, c], 3),
        };

        args.into_iter().take(len)
    }

    fn args_mut(&mut self) -> impl Iterator<Item = &mut Arg> {
        let args: Vec<&mut Arg> = match self {
            Self::Replace(a) => vec![a],
            Self::Modulate(a, b) | Self::Subtract(a, b) => vec![a, b],
            Self::Interpolate(a, b, c) | Self::MultiplyAdd(a, b, c) => vec![a, b, c],
        };

        args.into_iter()
    }
}

/// What a constant color register holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConstantValue {
    #[default]
    Zero,
    Prim,
    Env,
    LodFraction,
}

/// A channel operation before constants are assigned to stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ChannelOp {
    op: Op,
    /// Constant read by each argument, if any.
    constants: [Option<ConstantValue>; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TevStage {
    pub color: Op,
    pub alpha: Op,
    /// Values of the constant register, for the color and the alpha operation.
    pub constant: [ConstantValue; 2],
}

/// A complete texture environment configuration for a combiner.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TevPlan {
    pub stages: Vec<TevStage>,
    /// Alpha test reference, if texture edges are enabled.
    pub alpha_test: Option<u8>,
    pub blend: bool,
    pub fog: bool,
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("{channel:?} operation reads more than two constants")]
    TooManyConstants { channel: Channel },
    #[error("combiner needs {stages} stages")]
    TooManyStages { stages: usize },
}

/// A resolved combiner operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Term {
    Arg(Arg),
    Constant(ConstantValue),
}

fn resolve(operand: Operand, channel: Channel, mapping: &InputMapping) -> Term {
    let component = match channel {
        Channel::Color => Component::Color,
        Channel::Alpha => Component::Alpha,
    };

    let arg = |source| Term::Arg(Arg { source, component });
    match operand {
        Operand::Zero => Term::Constant(ConstantValue::Zero),
        Operand::Texel0 => arg(Source::Texture0),
        Operand::Texel1 => arg(Source::Texture1),
        Operand::Texel0Alpha => Term::Arg(Arg {
            source: Source::Texture0,
            component: Component::Alpha,
        }),
        generic => {
            let input = generic
                .input_index()
                .map(|index| mapping[channel as usize][index])
                .unwrap_or_default();

            match input {
                Input::Shade => arg(Source::Vertex),
                Input::Prim => Term::Constant(ConstantValue::Prim),
                Input::Env => Term::Constant(ConstantValue::Env),
                Input::LodFraction => Term::Constant(ConstantValue::LodFraction),
                _ => Term::Constant(ConstantValue::Zero),
            }
        }
    }
}

/// Builds an operation from terms, reading constants through the constant register.
fn channel_op<const N: usize>(
    channel: Channel,
    terms: [Term; N],
    build: impl FnOnce([Arg; N]) -> Op,
) -> ChannelOp {
    let component = match channel {
        Channel::Color => Component::Color,
        Channel::Alpha => Component::Alpha,
    };

    let mut constants = [None; 3];
    let args = std::array::from_fn(|i| match terms[i] {
        Term::Arg(arg) => arg,
        Term::Constant(value) => {
            constants[i] = Some(value);
            Arg {
                source: Source::Constant,
                component,
            }
        }
    });

    ChannelOp {
        op: build(args),
        constants,
    }
}

fn is_zero(term: Term) -> bool {
    term == Term::Constant(ConstantValue::Zero)
}

/// Operations computing one channel, in order.
fn channel_ops(
    features: &CombinerFeatures,
    mapping: &InputMapping,
    channel: Channel,
) -> Vec<ChannelOp> {
    let [a, b, c, d] = features.operands[channel as usize].map(|o| resolve(o, channel, mapping));
    let previous = Term::Arg(match channel {
        Channel::Color => Arg::PREVIOUS_COLOR,
        Channel::Alpha => Arg::PREVIOUS_ALPHA,
    });

    match features.shape(channel) {
        Shape::Single => vec![channel_op(channel, [d], |[d]| Op::Replace(d))],
        Shape::Multiply => vec![channel_op(channel, [a, c], |[a, c]| Op::Modulate(a, c))],
        Shape::Mix => vec![channel_op(channel, [a, b, c], |[a, b, c]| {
            Op::Interpolate(a, b, c)
        })],
        Shape::Full if is_zero(b) => vec![channel_op(channel, [a, c, d], |[a, c, d]| {
            Op::MultiplyAdd(a, c, d)
        })],
        Shape::Full if is_zero(d) => vec![
            channel_op(channel, [a, b], |[a, b]| Op::Subtract(a, b)),
            channel_op(channel, [previous, c], |[p, c]| Op::Modulate(p, c)),
        ],
        Shape::Full => vec![
            channel_op(channel, [a, b], |[a, b]| Op::Subtract(a, b)),
            channel_op(channel, [previous, c, d], |[p, c, d]| {
                Op::MultiplyAdd(p, c, d)
            }),
        ],
    }
}

/// Makes every operation read at most one distinct constant, loading the second one with an
/// extra stage where possible.
fn split_constants(ops: Vec<ChannelOp>, channel: Channel) -> Result<Vec<ChannelOp>, PlanError> {
    let component = match channel {
        Channel::Color => Component::Color,
        Channel::Alpha => Component::Alpha,
    };

    let mut result = Vec::with_capacity(ops.len() + 1);
    for mut op in ops {
        let first = op.constants.iter().flatten().next().copied();
        let second = op
            .constants
            .iter()
            .flatten()
            .copied()
            .find(|&value| Some(value) != first);

        let Some(second) = second else {
            result.push(op);
            continue;
        };

        let reads_previous = op.op.args().any(|arg| arg.source == Source::Previous);
        let third = op
            .constants
            .iter()
            .flatten()
            .any(|&value| Some(value) != first && value != second);

        if reads_previous || third {
            return Err(PlanError::TooManyConstants { channel });
        }

        // load the second constant first and read it back as the previous result
        result.push(ChannelOp {
            op: Op::Replace(Arg {
                source: Source::Constant,
                component,
            }),
            constants: [Some(second), None, None],
        });

        for (arg, constant) in op.op.args_mut().zip(op.constants.iter_mut()) {
            if *constant == Some(second) {
                *arg = Arg {
                    source: Source::Previous,
                    component,
                };
                *constant = None;
            }
        }

        result.push(op);
    }

    Ok(result)
}

fn constant_of(op: Option<&ChannelOp>) -> ConstantValue {
    op.and_then(|op| op.constants.iter().flatten().next().copied())
        .unwrap_or_default()
}

/// Plans the texture environment for a compiled combiner.
pub fn plan(features: &CombinerFeatures, mapping: &InputMapping) -> Result<TevPlan, PlanError> {
    let color = split_constants(channel_ops(features, mapping, Channel::Color), Channel::Color)?;
    let alpha = split_constants(channel_ops(features, mapping, Channel::Alpha), Channel::Alpha)?;

    let len = color.len().max(alpha.len());
    if len > MAX_STAGES {
        return Err(PlanError::TooManyStages { stages: len });
    }

    let stages = (0..len)
        .map(|i| TevStage {
            color: color.get(i).map_or(Op::Replace(Arg::PREVIOUS_COLOR), |op| op.op),
            alpha: alpha.get(i).map_or(Op::Replace(Arg::PREVIOUS_ALPHA), |op| op.op),
            constant: [constant_of(color.get(i)), constant_of(alpha.get(i))],
        })
        .collect();

    Ok(TevPlan::with_flags(stages, features.flags))
}

impl TevPlan {
    fn with_flags(stages: Vec<TevStage>, flags: CombinerFlags) -> Self {
        Self {
            stages,
            alpha_test: flags
                .contains(CombinerFlags::TEXTURE_EDGE)
                .then_some(TEXTURE_EDGE_REFERENCE),
            blend: flags.contains(CombinerFlags::ALPHA),
            fog: flags.contains(CombinerFlags::FOG),
        }
    }

    /// The plan used for combiners that cannot be mapped: the vertex color, modulated by the
    /// first texture if the combiner samples it.
    pub fn fallback(features: &CombinerFeatures) -> Self {
        let vertex = |component| Arg {
            source: Source::Vertex,
            component,
        };
        let texture = |component| Arg {
            source: Source::Texture0,
            component,
        };

        let (color, alpha) = if features.used_textures[0] {
            (
                Op::Modulate(texture(Component::Color), vertex(Component::Color)),
                Op::Modulate(texture(Component::Alpha), vertex(Component::Alpha)),
            )
        } else {
            (
                Op::Replace(vertex(Component::Color)),
                Op::Replace(vertex(Component::Alpha)),
            )
        };

        let stage = TevStage {
            color,
            alpha,
            constant: [ConstantValue::Zero; 2],
        };

        Self::with_flags(vec![stage], features.flags)
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match self.source {
            Source::Vertex => "vertex",
            Source::Texture0 => "tex0",
            Source::Texture1 => "tex1",
            Source::Constant => "const",
            Source::Previous => "prev",
        };

        let component = match self.component {
            Component::Color => "rgb",
            Component::Alpha => "a",
        };

        write!(f, "{source}.{component}")
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Replace(a) => write!(f, "replace({a})"),
            Self::Modulate(a, b) => write!(f, "modulate({a}, {b})"),
            Self::Interpolate(a, b, c) => write!(f, "interpolate({a}, {b}, {c})"),
            Self::Subtract(a, b) => write!(f, "subtract({a}, {b})"),
            Self::MultiplyAdd(a, b, c) => write!(f, "multiply_add({a}, {b}, {c})"),
        }
    }
}

impl fmt::Display for TevPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, stage) in self.stages.iter().enumerate() {
            writeln!(
                f,
                "  {index}: rgb={} a={} const={:?}",
                stage.color, stage.alpha, stage.constant
            )?;
        }

        write!(
            f,
            "  alpha_test={:?} blend={} fog={}",
            self.alpha_test, self.blend, self.fog
        )
    }
}
