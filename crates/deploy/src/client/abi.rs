//! ABI encoding between JSON argument values and EVM calldata.

use alloy_core::{
    dyn_abi::{DynSolType, DynSolValue, FunctionExt, JsonAbiExt, Specifier},
    json_abi::{Function, JsonAbi, Param},
};
use anyhow::{Context, Result};
use serde_json::Value;

/// Parse an interface descriptor (a JSON ABI array).
pub(crate) fn parse_interface(interface: &Value) -> Result<JsonAbi> {
    serde_json::from_value(interface.clone()).context("Failed to parse contract ABI")
}

/// Render a JSON argument as the textual form understood by `DynSolType::coerce_str`.
pub fn abi_literal(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => format!(
            "[{}]",
            items.iter().map(abi_literal).collect::<Vec<_>>().join(",")
        ),
        Value::Object(_) => value.to_string(),
    }
}

/// Convert a decoded solidity value into JSON.
///
/// Integers become decimal strings so that 256-bit values survive the round trip.
pub fn sol_to_json(value: &DynSolValue) -> Value {
    match value {
        DynSolValue::Address(address) => Value::String(address.to_checksum(None)),
        DynSolValue::Bool(b) => Value::Bool(*b),
        DynSolValue::Uint(u, _) => Value::String(u.to_string()),
        DynSolValue::Int(i, _) => Value::String(i.to_string()),
        DynSolValue::String(s) => Value::String(s.clone()),
        DynSolValue::Bytes(bytes) => Value::String(format!("0x{}", hex::encode(bytes))),
        DynSolValue::FixedBytes(word, size) => {
            Value::String(format!("0x{}", hex::encode(&word[..*size])))
        }
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) | DynSolValue::Tuple(items) => {
            Value::Array(items.iter().map(sol_to_json).collect())
        }
        other => Value::String(format!("{:?}", other)),
    }
}

fn coerce_params(params: &[Param], args: &[Value]) -> Result<Vec<DynSolValue>> {
    if params.len() != args.len() {
        anyhow::bail!(
            "Expected {} argument(s), got {}",
            params.len(),
            args.len()
        );
    }

    params
        .iter()
        .zip(args)
        .map(|(param, arg)| {
            let ty: DynSolType = param
                .resolve()
                .with_context(|| format!("Unsupported parameter type `{}`", param.ty))?;
            let literal = abi_literal(arg);
            ty.coerce_str(&literal).with_context(|| {
                format!(
                    "Cannot encode `{}` as `{}` for parameter `{}`",
                    literal, param.ty, param.name
                )
            })
        })
        .collect()
}

/// Build contract creation data: bytecode followed by the encoded constructor arguments.
pub(crate) fn encode_deploy(interface: &Value, bytecode: &str, args: &[Value]) -> Result<Vec<u8>> {
    let abi = parse_interface(interface)?;
    let mut data =
        hex::decode(bytecode.trim_start_matches("0x")).context("Failed to decode bytecode")?;

    match abi.constructor() {
        Some(constructor) => {
            let values = coerce_params(&constructor.inputs, args)?;
            let encoded = constructor
                .abi_encode_input(&values)
                .context("Failed to encode constructor arguments")?;
            data.extend_from_slice(&encoded);
        }
        None if !args.is_empty() => {
            anyhow::bail!("Contract has no constructor but {} argument(s) were given", args.len())
        }
        None => {}
    }

    Ok(data)
}

/// Find the function a method reference points at.
///
/// `method` is either a bare name (`registerUser`) or a full signature
/// (`purchaseItem(uint256,address)`) to disambiguate overloads.
pub(crate) fn select_function<'a>(abi: &'a JsonAbi, method: &str, argc: usize) -> Result<&'a Function> {
    if method.contains('(') {
        return abi
            .functions()
            .find(|function| function.signature() == method)
            .with_context(|| format!("No function with signature `{}` in ABI", method));
    }

    let overloads = abi
        .function(method)
        .with_context(|| format!("No function named `{}` in ABI", method))?;

    let mut candidates = overloads.iter().filter(|f| f.inputs.len() == argc);
    match (candidates.next(), candidates.next()) {
        (Some(function), None) => Ok(function),
        (None, _) => anyhow::bail!("No overload of `{}` takes {} argument(s)", method, argc),
        (Some(_), Some(_)) => anyhow::bail!(
            "`{}` is ambiguous with {} argument(s); use its full signature",
            method,
            argc
        ),
    }
}

/// Encode calldata for a method call.
pub(crate) fn encode_call(function: &Function, args: &[Value]) -> Result<Vec<u8>> {
    let values = coerce_params(&function.inputs, args)?;
    function
        .abi_encode_input(&values)
        .with_context(|| format!("Failed to encode call to `{}`", function.signature()))
}

/// Decode the return data of a method call into JSON values.
pub(crate) fn decode_output(function: &Function, data: &[u8]) -> Result<Vec<Value>> {
    let values = function
        .abi_decode_output(data, true)
        .with_context(|| format!("Failed to decode output of `{}`", function.signature()))?;
    Ok(values.iter().map(sol_to_json).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_core::primitives::{Address, U256};
    use serde_json::json;

    fn token_abi() -> Value {
        json!([
            {
                "type": "constructor",
                "stateMutability": "nonpayable",
                "inputs": [
                    { "name": "name", "type": "string", "internalType": "string" },
                    { "name": "symbol", "type": "string", "internalType": "string" }
                ]
            },
            {
                "type": "function",
                "name": "transferOwnership",
                "stateMutability": "nonpayable",
                "inputs": [{ "name": "newOwner", "type": "address", "internalType": "address" }],
                "outputs": []
            },
            {
                "type": "function",
                "name": "owner",
                "stateMutability": "view",
                "inputs": [],
                "outputs": [{ "name": "", "type": "address", "internalType": "address" }]
            },
            {
                "type": "function",
                "name": "mint",
                "stateMutability": "nonpayable",
                "inputs": [{ "name": "amount", "type": "uint256", "internalType": "uint256" }],
                "outputs": []
            },
            {
                "type": "function",
                "name": "mint",
                "stateMutability": "nonpayable",
                "inputs": [
                    { "name": "to", "type": "address", "internalType": "address" },
                    { "name": "amount", "type": "uint256", "internalType": "uint256" }
                ],
                "outputs": []
            }
        ])
    }

    #[test]
    fn test_abi_literal() {
        assert_eq!(abi_literal(&json!("KK")), "KK");
        assert_eq!(abi_literal(&json!(100000000)), "100000000");
        assert_eq!(abi_literal(&json!(true)), "true");
        assert_eq!(abi_literal(&json!([1, 2, 3])), "[1,2,3]");
    }

    #[test]
    fn test_encode_deploy_appends_constructor_args() {
        let data = encode_deploy(&token_abi(), "0x6080", &[json!("KK"), json!("KK")]).unwrap();

        assert_eq!(&data[..2], &[0x60, 0x80]);
        // Two string heads, then length + padded data for each string.
        assert_eq!(data.len(), 2 + 32 * 6);
    }

    #[test]
    fn test_encode_deploy_rejects_wrong_arity() {
        assert!(encode_deploy(&token_abi(), "0x6080", &[json!("KK")]).is_err());
    }

    #[test]
    fn test_encode_transfer_ownership() {
        let abi = parse_interface(&token_abi()).unwrap();
        let function = select_function(&abi, "transferOwnership", 1).unwrap();
        let data = encode_call(
            function,
            &[json!("0xe7f1725e7734ce288f8367e1bb143e90bb3f0512")],
        )
        .unwrap();

        // transferOwnership(address) selector
        assert_eq!(hex::encode(&data[..4]), "f2fde38b");
        assert_eq!(
            hex::encode(&data[4..]),
            "000000000000000000000000e7f1725e7734ce288f8367e1bb143e90bb3f0512"
        );
    }

    #[test]
    fn test_select_overload_by_arity_and_signature() {
        let abi = parse_interface(&token_abi()).unwrap();

        assert_eq!(select_function(&abi, "mint", 1).unwrap().inputs.len(), 1);
        assert_eq!(select_function(&abi, "mint", 2).unwrap().inputs.len(), 2);
        assert_eq!(
            select_function(&abi, "mint(address,uint256)", 2)
                .unwrap()
                .signature(),
            "mint(address,uint256)"
        );
        assert!(select_function(&abi, "mint", 3).is_err());
        assert!(select_function(&abi, "burn", 1).is_err());
    }

    #[test]
    fn test_decode_owner_output() {
        let abi = parse_interface(&token_abi()).unwrap();
        let function = select_function(&abi, "owner", 0).unwrap();
        let owner: Address = "0xe7f1725e7734ce288f8367e1bb143e90bb3f0512".parse().unwrap();

        let mut word = [0u8; 32];
        word[12..].copy_from_slice(owner.as_slice());

        let values = decode_output(function, &word).unwrap();
        assert_eq!(values, vec![json!(owner.to_checksum(None))]);
    }

    #[test]
    fn test_sol_to_json_uint_is_decimal_string() {
        let value = DynSolValue::Uint(U256::from(100_000_000u64), 256);
        assert_eq!(sol_to_json(&value), json!("100000000"));
    }
}
