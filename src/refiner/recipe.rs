//! # 精修配方
//!
//! 命令行以逗号分隔的步骤序列描述精修流程：
//!
//! ```text
//! lebail, background:5, cell, strain:uniaxial, size, inst:U+V+W
//! ```
//!
//! | 步骤 | 含义 |
//! |------|------|
//! | `lebail` / `nolebail` | LeBail 模式开关 |
//! | `background[:N]` | 背景，N 个系数（默认 3） |
//! | `cell[:i]` | 晶胞参数，可选物相序号 |
//! | `strain[:model]` | 微应变展宽，isotropic（默认）/ uniaxial / generalized |
//! | `size[:model]` | 晶粒尺寸展宽，isotropic（默认）/ uniaxial / ellipsoidal |
//! | `inst[:A+B]` | 仪器参数，缺省为完整默认列表 |
//!
//! ## 依赖关系
//! - 被 `commands/refine.rs` 使用
//! - 作用于 `refiner/single.rs`, `refiner/sequential.rs`

use crate::engine::{BroadeningModel, InstrumentParameter, ParameterGroup, RefinementEngine};
use crate::error::{Result, SuliError};
use crate::refiner::sequential::SeqRefiner;
use crate::refiner::single::Refiner;
use crate::utils::output::print_warning;

use std::fmt;
use std::str::FromStr;

/// 默认背景系数个数
pub const DEFAULT_BACKGROUND_COEFFS: u32 = 3;

/// 命令行默认配方
pub const DEFAULT_RECIPE: &str = "background:3,cell,strain,size,inst";

/// 单个配方步骤
#[derive(Debug, Clone, PartialEq)]
pub enum RecipeStep {
    LeBail(bool),
    Background(u32),
    Cell(Option<usize>),
    Strain(BroadeningModel),
    Size(BroadeningModel),
    Inst(Vec<InstrumentParameter>),
}

impl fmt::Display for RecipeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecipeStep::LeBail(true) => write!(f, "lebail"),
            RecipeStep::LeBail(false) => write!(f, "nolebail"),
            RecipeStep::Background(n) => write!(f, "background:{}", n),
            RecipeStep::Cell(None) => write!(f, "cell"),
            RecipeStep::Cell(Some(i)) => write!(f, "cell:{}", i),
            RecipeStep::Strain(BroadeningModel::Isotropic) => write!(f, "strain"),
            RecipeStep::Strain(model) => write!(f, "strain:{}", model),
            RecipeStep::Size(BroadeningModel::Isotropic) => write!(f, "size"),
            RecipeStep::Size(model) => write!(f, "size:{}", model),
            RecipeStep::Inst(params) if params.is_empty() => write!(f, "inst"),
            RecipeStep::Inst(params) => {
                let names: Vec<&str> = params.iter().map(|p| p.name()).collect();
                write!(f, "inst:{}", names.join("+"))
            }
        }
    }
}

impl FromStr for RecipeStep {
    type Err = SuliError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (name, arg) = match s.split_once(':') {
            Some((n, a)) => (n.trim(), Some(a.trim())),
            None => (s, None),
        };

        let bad_arg = |arg: &str| {
            SuliError::InvalidArgument(format!("invalid argument '{}' for step '{}'", arg, name))
        };

        match (name.to_ascii_lowercase().as_str(), arg) {
            ("lebail", None) => Ok(RecipeStep::LeBail(true)),
            ("nolebail", None) => Ok(RecipeStep::LeBail(false)),
            ("background" | "bkg", None) => Ok(RecipeStep::Background(DEFAULT_BACKGROUND_COEFFS)),
            ("background" | "bkg", Some(a)) => match a.parse::<u32>() {
                Ok(n) if n > 0 => Ok(RecipeStep::Background(n)),
                _ => Err(bad_arg(a)),
            },
            ("cell", None) => Ok(RecipeStep::Cell(None)),
            ("cell", Some(a)) => a
                .parse::<usize>()
                .map(|i| RecipeStep::Cell(Some(i)))
                .map_err(|_| bad_arg(a)),
            ("strain", None) => Ok(RecipeStep::Strain(BroadeningModel::Isotropic)),
            ("strain", Some(a)) => {
                let model = a.parse().map_err(|_| bad_arg(a))?;
                ParameterGroup::mustrain(model)?;
                Ok(RecipeStep::Strain(model))
            }
            ("size", None) => Ok(RecipeStep::Size(BroadeningModel::Isotropic)),
            ("size", Some(a)) => {
                let model = a.parse().map_err(|_| bad_arg(a))?;
                ParameterGroup::size(model)?;
                Ok(RecipeStep::Size(model))
            }
            ("inst", None) => Ok(RecipeStep::Inst(Vec::new())),
            ("inst", Some(a)) => a
                .split('+')
                .filter(|p| !p.trim().is_empty())
                .map(str::parse)
                .collect::<Result<Vec<_>>>()
                .map(RecipeStep::Inst),
            (_, Some(a)) if ["lebail", "nolebail"].contains(&name) => {
                Err(bad_arg(a))
            }
            _ => Err(SuliError::InvalidArgument(format!(
                "unknown refinement step '{}' (expected lebail, nolebail, background[:N], cell[:i], strain[:model], size[:model], inst[:A+B])",
                s
            ))),
        }
    }
}

/// 步骤序列
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Recipe {
    pub steps: Vec<RecipeStep>,
}

impl Recipe {
    pub fn parse(s: &str) -> Result<Self> {
        let steps = s
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(str::parse)
            .collect::<Result<Vec<RecipeStep>>>()?;
        if steps.is_empty() {
            return Err(SuliError::InvalidArgument(
                "refinement recipe is empty".to_string(),
            ));
        }
        Ok(Recipe { steps })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// 依次执行所有步骤，遇错即停
    pub fn apply<R: RefinementSteps + ?Sized>(&self, refiner: &mut R) -> Result<()> {
        for step in &self.steps {
            match step {
                RecipeStep::LeBail(on) => refiner.lebail(*on)?,
                RecipeStep::Background(n) => refiner.background(*n)?,
                RecipeStep::Cell(phase) => refiner.cell(*phase)?,
                RecipeStep::Strain(model) => refiner.strain(*model)?,
                RecipeStep::Size(model) => refiner.size(*model)?,
                RecipeStep::Inst(params) => refiner.instrument(params)?,
            }
        }
        Ok(())
    }
}

impl FromStr for Recipe {
    type Err = SuliError;

    fn from_str(s: &str) -> Result<Self> {
        Recipe::parse(s)
    }
}

impl fmt::Display for Recipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.steps.iter().map(|s| s.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

/// 配方可驱动的精修步骤
pub trait RefinementSteps {
    fn lebail(&mut self, enabled: bool) -> Result<()>;
    fn background(&mut self, coeffs: u32) -> Result<()>;
    fn cell(&mut self, phase: Option<usize>) -> Result<()>;
    fn strain(&mut self, model: BroadeningModel) -> Result<()>;
    fn size(&mut self, model: BroadeningModel) -> Result<()>;
    fn instrument(&mut self, parameters: &[InstrumentParameter]) -> Result<()>;
}

impl<E: RefinementEngine> RefinementSteps for Refiner<E> {
    fn lebail(&mut self, enabled: bool) -> Result<()> {
        self.set_lebail(enabled)
    }

    fn background(&mut self, coeffs: u32) -> Result<()> {
        self.refine_background(coeffs)
    }

    fn cell(&mut self, phase: Option<usize>) -> Result<()> {
        self.refine_cell_params(phase)
    }

    fn strain(&mut self, model: BroadeningModel) -> Result<()> {
        self.refine_strain_broadening(model)
    }

    fn size(&mut self, model: BroadeningModel) -> Result<()> {
        self.refine_size_broadening(model)
    }

    fn instrument(&mut self, parameters: &[InstrumentParameter]) -> Result<()> {
        self.refine_inst_parameters(parameters)
    }
}

impl<E: RefinementEngine> RefinementSteps for SeqRefiner<E> {
    fn lebail(&mut self, enabled: bool) -> Result<()> {
        self.set_lebail(enabled)
    }

    fn background(&mut self, coeffs: u32) -> Result<()> {
        let isolated = self.steps_isolated();
        self.refine_background(coeffs, isolated)
    }

    fn cell(&mut self, phase: Option<usize>) -> Result<()> {
        if let Some(i) = phase {
            print_warning(&format!(
                "Sequential cell refinement acts on all phases; ignoring phase #{}",
                i
            ));
        }
        let isolated = self.steps_isolated();
        self.refine_cell_params(isolated)
    }

    fn strain(&mut self, model: BroadeningModel) -> Result<()> {
        let isolated = self.steps_isolated();
        self.refine_strain_broadening(model, isolated)
    }

    fn size(&mut self, model: BroadeningModel) -> Result<()> {
        let isolated = self.steps_isolated();
        self.refine_size_broadening(model, isolated)
    }

    fn instrument(&mut self, parameters: &[InstrumentParameter]) -> Result<()> {
        let isolated = self.steps_isolated();
        self.refine_inst_parameters(parameters, isolated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 记录调用顺序
    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
        fail_on: Option<&'static str>,
    }

    impl Recorder {
        fn push(&mut self, call: String) -> Result<()> {
            if self.fail_on.is_some_and(|f| call.starts_with(f)) {
                return Err(SuliError::Other(call));
            }
            self.calls.push(call);
            Ok(())
        }
    }

    impl RefinementSteps for Recorder {
        fn lebail(&mut self, enabled: bool) -> Result<()> {
            self.push(format!("lebail {}", enabled))
        }
        fn background(&mut self, coeffs: u32) -> Result<()> {
            self.push(format!("background {}", coeffs))
        }
        fn cell(&mut self, phase: Option<usize>) -> Result<()> {
            self.push(format!("cell {:?}", phase))
        }
        fn strain(&mut self, model: BroadeningModel) -> Result<()> {
            self.push(format!("strain {}", model))
        }
        fn size(&mut self, model: BroadeningModel) -> Result<()> {
            self.push(format!("size {}", model))
        }
        fn instrument(&mut self, parameters: &[InstrumentParameter]) -> Result<()> {
            self.push(format!("inst {}", parameters.len()))
        }
    }

    #[test]
    fn test_parse_steps() {
        let r = Recipe::parse("lebail, background:5, cell:1, strain,size, inst:U+V+SH/L").unwrap();
        assert_eq!(
            r.steps,
            vec![
                RecipeStep::LeBail(true),
                RecipeStep::Background(5),
                RecipeStep::Cell(Some(1)),
                RecipeStep::Strain(BroadeningModel::Isotropic),
                RecipeStep::Size(BroadeningModel::Isotropic),
                RecipeStep::Inst(vec![
                    InstrumentParameter::U,
                    InstrumentParameter::V,
                    InstrumentParameter::ShL
                ]),
            ]
        );
        assert_eq!(r.to_string(), "lebail,background:5,cell:1,strain,size,inst:U+V+SH/L");
    }

    #[test]
    fn test_parse_broadening_models() {
        let r = Recipe::parse("strain:uniaxial, size:ell, strain:iso").unwrap();
        assert_eq!(
            r.steps,
            vec![
                RecipeStep::Strain(BroadeningModel::Uniaxial),
                RecipeStep::Size(BroadeningModel::Ellipsoidal),
                RecipeStep::Strain(BroadeningModel::Isotropic),
            ]
        );
        assert_eq!(r.to_string(), "strain:uniaxial,size:ellipsoidal,strain");

        let mut rec = Recorder::default();
        r.apply(&mut rec).unwrap();
        assert_eq!(rec.calls, vec!["strain uniaxial", "size ellipsoidal", "strain isotropic"]);
    }

    #[test]
    fn test_default_recipe() {
        let r: Recipe = DEFAULT_RECIPE.parse().unwrap();
        assert_eq!(r.len(), 5);
        assert_eq!(r.steps[0], RecipeStep::Background(3));
        assert_eq!(r.steps[4], RecipeStep::Inst(Vec::new()));
    }

    #[test]
    fn test_parse_errors() {
        assert!(Recipe::parse("").is_err());
        assert!(Recipe::parse(" , ").is_err());
        assert!(Recipe::parse("background:0").is_err());
        assert!(Recipe::parse("background:x").is_err());
        assert!(Recipe::parse("cell:-1").is_err());
        assert!(Recipe::parse("strain:2").is_err());
        assert!(Recipe::parse("strain:ellipsoidal").is_err());
        assert!(Recipe::parse("size:generalized").is_err());
        assert!(Recipe::parse("lebail:1").is_err());
        assert!(Recipe::parse("inst:Lam").is_err());
        assert!(Recipe::parse("texture").is_err());
    }

    #[test]
    fn test_apply_in_order() {
        let r = Recipe::parse("nolebail,bkg,cell,inst").unwrap();
        let mut rec = Recorder::default();
        r.apply(&mut rec).unwrap();
        assert_eq!(rec.calls, vec!["lebail false", "background 3", "cell None", "inst 0"]);
    }

    #[test]
    fn test_apply_stops_on_error() {
        let r = Recipe::parse("background,cell,strain").unwrap();
        let mut rec = Recorder {
            fail_on: Some("cell"),
            ..Recorder::default()
        };
        assert!(r.apply(&mut rec).is_err());
        assert_eq!(rec.calls, vec!["background 3"]);
    }
}
