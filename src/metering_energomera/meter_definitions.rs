use lazy_static::lazy_static;

use super::structs::RegisterSpec;

lazy_static! {
    /// Registers read on every poll, in the order they are requested
    pub static ref REGISTER_CATALOG: Vec<RegisterSpec> = vec![
        RegisterSpec {
            function_code: "POWPP",
            name: "active_power",
            sub_names: &["a", "b", "c"],
            description: "Active power on phase {{phase}}",
        },
        RegisterSpec {
            function_code: "VOLTA",
            name: "voltage",
            sub_names: &["a", "b", "c"],
            description: "Voltage on phase {{phase}}",
        },
        RegisterSpec {
            function_code: "CORUU",
            name: "phase_angle",
            sub_names: &["ab", "bc", "ca"],
            description: "Phase angle between {{phase}}",
        },
        RegisterSpec {
            function_code: "CURRE",
            name: "current",
            sub_names: &["a", "b", "c"],
            description: "Current on phase {{phase}}",
        },
        RegisterSpec {
            function_code: "FREQU",
            name: "frequency",
            sub_names: &["total"],
            description: "Power grid frequency",
        },
        RegisterSpec {
            function_code: "COS_f",
            name: "active_power_coeff",
            sub_names: &["total", "a", "b", "c"],
            description: "Active power coefficient on {{phase}}",
        },
        RegisterSpec {
            function_code: "CORIU",
            name: "i_u_angle",
            sub_names: &["a", "b", "c"],
            description: "Angle between I and U on phase {{phase}}",
        },
        RegisterSpec {
            function_code: "TAN_f",
            name: "reactive_power_coeff",
            sub_names: &["total", "a", "b", "c"],
            description: "Reactive power coefficient on {{phase}}",
        },
    ];
}

pub fn get_register_by_code(function_code: &str) -> Option<&'static RegisterSpec> {
    REGISTER_CATALOG.iter().find(|r| r.function_code == function_code)
}
