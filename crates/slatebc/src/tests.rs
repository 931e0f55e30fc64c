#[cfg(test)]
mod tests {
    use crate::code::*;
    use crate::validate::validate;
    use crate::*;
    use pretty_assertions::assert_eq;

    fn sample_code() -> Code {
        let mut code = Code::new();
        let mut main = Function::new("main", Signature::new(VarType::Void, Vec::<(VarType, String)>::new()));
        main.slots.allocate(VarType::Int);
        let hello = code.make_string_constant("hello").unwrap();
        main.bytecode.emit_with_u16(Op::SLoad, hello);
        main.bytecode.emit(Op::SPrint);
        main.bytecode.emit(Op::ILoad);
        main.bytecode.emit_i64(42);
        main.bytecode.emit_with_u16(Op::StoreIVar, 0);
        main.bytecode.emit(Op::Return);
        code.add_function(main).unwrap();
        code
    }

    #[test]
    fn test_opcode_bytes_follow_declaration_order() {
        assert_eq!(Op::Invalid.to_byte(), 0);
        assert_eq!(Op::DLoad.to_byte(), 1);
        assert_eq!(Op::Break.to_byte() as usize, Op::ALL.len() - 1);
        for (i, op) in Op::ALL.iter().enumerate() {
            assert_eq!(Op::from_byte(i as u8), Some(*op));
        }
        assert_eq!(Op::from_byte(Op::ALL.len() as u8), None);
    }

    #[test]
    fn test_opcode_widths() {
        assert_eq!(Op::ILoad.length(), 9);
        assert_eq!(Op::DLoad.length(), 9);
        assert_eq!(Op::SLoad.length(), 3);
        assert_eq!(Op::LoadIVar.length(), 3);
        assert_eq!(Op::LoadCtxIVar.length(), 5);
        assert_eq!(Op::Ja.length(), 3);
        assert_eq!(Op::IfICmpLe.length(), 5);
        assert_eq!(Op::Call.length(), 3);
        assert_eq!(Op::IAdd.length(), 1);
        assert_eq!(Op::IfICmpNe.name(), "IFICMPNE");
    }

    #[test]
    fn test_common_type_lattice() {
        assert_eq!(VarType::common(VarType::Int, VarType::Int), VarType::Int);
        assert_eq!(VarType::common(VarType::Int, VarType::Double), VarType::Double);
        assert_eq!(VarType::common(VarType::Double, VarType::Int), VarType::Double);
        assert_eq!(VarType::common(VarType::Int, VarType::String), VarType::String);
        assert_eq!(VarType::common(VarType::String, VarType::Double), VarType::String);
        assert_eq!(VarType::common(VarType::Void, VarType::Int), VarType::Invalid);
        assert_eq!(VarType::common(VarType::Int, VarType::Invalid), VarType::Invalid);
        assert_eq!(VarType::common(VarType::Void, VarType::Void), VarType::Void);
        assert!(VarType::Int.lattice_cmp(VarType::String).unwrap().is_lt());
        assert!(VarType::Logic.lattice_cmp(VarType::Int).is_none());
    }

    #[test]
    fn test_type_names_match_serialized_form() {
        for ty in [VarType::Int, VarType::Double, VarType::String, VarType::Void] {
            let json = serde_json::to_string(&ty).unwrap();
            assert_eq!(json, format!("\"{}\"", ty.name()));
            assert_eq!(serde_json::from_str::<VarType>(&json).unwrap(), ty);
        }
        assert!(serde_json::from_str::<VarType>("\"float\"").is_err());
    }

    #[test]
    fn test_signature_layout() {
        let sig = Signature::new(VarType::Double, [(VarType::Int, "a"), (VarType::String, "b")]);
        assert_eq!(sig.return_type(), VarType::Double);
        assert_eq!(sig.param_count(), 2);
        assert_eq!(sig.param_type(1), Some(VarType::String));
        assert_eq!(sig.elements()[0].name, Signature::RETURN_NAME);
        assert_eq!(sig.to_string(), "(int a, string b) -> double");
    }

    #[test]
    fn test_empty_signature_is_rejected() {
        assert!(serde_json::from_str::<Signature>("[]").is_err());
    }

    #[test]
    fn test_slot_counts_are_per_type() {
        let mut slots = SlotCounts::default();
        assert_eq!(slots.allocate(VarType::Int), Some(0));
        assert_eq!(slots.allocate(VarType::Double), Some(0));
        assert_eq!(slots.allocate(VarType::Int), Some(1));
        assert_eq!(slots.allocate(VarType::Logic), None);
        assert_eq!(slots.get(VarType::Int), 2);
        assert_eq!(slots.total(), 3);
    }

    #[test]
    fn test_bytecode_literals_are_little_endian() {
        let mut bc = Bytecode::new();
        bc.emit(Op::ILoad);
        bc.emit_i64(-2);
        bc.emit(Op::DLoad);
        bc.emit_f64(1.5);
        let insns: Vec<_> = bc.instructions().map(Result::unwrap).collect();
        assert_eq!(insns.len(), 2);
        assert_eq!(insns[0].int_operand(), Some(-2));
        assert_eq!(insns[1].offset, 9);
        assert_eq!(insns[1].double_operand(), Some(1.5));
        assert_eq!(&bc.as_bytes()[1..3], &[0xFE, 0xFF]);
    }

    #[test]
    fn test_sites_are_tracked_until_patched() {
        let mut bc = Bytecode::new();
        bc.emit(Op::Ja);
        let jump = bc.reserve_u16();
        let conv = bc.reserve_op();
        assert_eq!(bc.open_sites().collect::<Vec<_>>(), vec![1, 3]);
        assert!(matches!(bc.ensure_patched(), Err(BytecodeError::UnpatchedSite { offset: 1 })));

        bc.patch_target(jump, 3).unwrap();
        bc.patch_op_site(conv, Op::I2D).unwrap();
        assert!(bc.ensure_patched().is_ok());
        assert_eq!(bc.read_u16(1), Some(3));
        assert_eq!(bc.as_bytes()[3], Op::I2D.to_byte());
    }

    #[test]
    fn test_patch_keeps_earlier_offsets() {
        let mut bc = Bytecode::new();
        bc.emit(Op::Ja);
        let site = bc.reserve_u16();
        for _ in 0..1000 {
            bc.emit(Op::ILoad0);
        }
        bc.patch_target(site, 1003).unwrap();
        assert_eq!(bc.read_u16(site.offset()), Some(1003));
        assert_eq!(bc.len(), 1003);
    }

    #[test]
    fn test_patch_target_too_far() {
        let mut bc = Bytecode::new();
        bc.emit(Op::Ja);
        let site = bc.reserve_u16();
        assert_eq!(
            bc.patch_target(site, 70_000),
            Err(BytecodeError::CodeTooLarge(70_000))
        );
        assert!(bc.patch_u16(10, 0).is_err());
    }

    #[test]
    fn test_decode_reports_truncation_and_unknown_bytes() {
        let bc = Bytecode::from_bytes(vec![Op::ILoad.to_byte(), 1, 2]);
        let first = bc.instructions().next().unwrap();
        assert!(matches!(first, Err(BytecodeError::Truncated { offset: 0, op: Op::ILoad })));

        let bc = Bytecode::from_bytes(vec![Op::Pop.to_byte(), 0xF0]);
        let results: Vec<_> = bc.instructions().collect();
        assert_eq!(results.len(), 2);
        assert!(matches!(results[1], Err(BytecodeError::UnknownOpcode { offset: 1, byte: 0xF0 })));
    }

    #[test]
    fn test_function_id_assigned_once() {
        let mut f = Function::new("f", Signature::new(VarType::Void, Vec::<(VarType, String)>::new()));
        f.assign_id(3).unwrap();
        assert_eq!(f.id(), Some(3));
        assert!(matches!(
            f.assign_id(4),
            Err(BytecodeError::IdReassigned { existing: 3, requested: 4, .. })
        ));

        let mut code = Code::new();
        assert!(code.add_function(f).is_err());
        assert!(code.functions().is_empty());
    }

    #[test]
    fn test_constant_pool_dedup() {
        let mut code = Code::new();
        assert_eq!(code.constant_by_id(0), Some(""));
        assert_eq!(code.make_string_constant(""), Ok(0));
        let a = code.make_string_constant("a").unwrap();
        let b = code.make_string_constant("b").unwrap();
        assert_eq!(code.make_string_constant("a"), Ok(a));
        assert_eq!((a, b), (1, 2));
        assert_eq!(code.constants().len(), 3);
    }

    #[test]
    fn test_function_lookup_by_id_and_name() {
        let mut code = Code::new();
        let sig = Signature::new(VarType::Int, [(VarType::Int, "x")]);
        let first = code.add_function(Function::new("f", sig.clone())).unwrap();
        let second = code.add_function(Function::new("f", sig)).unwrap();
        assert_eq!((first, second), (0, 1));
        assert_eq!(code.function_by_name("f").and_then(Function::id), Some(0));
        assert_eq!(code.function_by_id(1).map(|f| f.param_count()), Some(1));
        assert!(code.function_by_name("g").is_none());
    }

    #[test]
    fn test_native_registry() {
        let mut code = Code::new();
        let sig = Signature::new(VarType::Double, [(VarType::Double, "x")]);
        let id = code.make_native_function("sqrt", sig.clone(), NativeAddress(0x1000)).unwrap();
        assert_eq!(code.make_native_function("sqrt", sig, NativeAddress(0x2000)), Ok(id));
        let native = code.native_by_id(id).unwrap();
        assert_eq!(native.address, NativeAddress(0x1000));
        assert_eq!(native.signature.return_type(), VarType::Double);
    }

    #[test]
    fn test_code_json_roundtrip() {
        let code = sample_code();
        let json = code.to_json().unwrap();
        let restored = Code::from_json(&json).unwrap();
        assert_eq!(code, restored);
    }

    #[test]
    fn test_code_binary_roundtrip() {
        let code = sample_code();
        let bytes = code.to_bytes().unwrap();
        assert_eq!(&bytes[0..4], &MAGIC);
        let restored = Code::from_bytes(&bytes).unwrap();
        assert_eq!(code, restored);
    }

    #[test]
    fn test_invalid_magic() {
        let data = vec![0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x02, 0x00, 0x00, 0x00, b'{', b'}'];
        assert!(matches!(Code::from_bytes(&data), Err(BytecodeError::InvalidMagic)));
    }

    #[test]
    fn test_validate_accepts_well_formed_code() {
        assert!(validate(&sample_code()).is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_jump_target() {
        let mut code = Code::new();
        let mut f = Function::new("f", Signature::new(VarType::Void, Vec::<(VarType, String)>::new()));
        f.bytecode.emit(Op::ILoad);
        f.bytecode.emit_i64(7);
        f.bytecode.emit_with_u16(Op::Ja, 4);
        f.bytecode.emit(Op::Return);
        code.add_function(f).unwrap();
        let msg = validate(&code).unwrap_err().to_string();
        assert!(msg.contains("not an instruction boundary"), "{msg}");
    }

    #[test]
    fn test_validate_rejects_unknown_slot_and_call() {
        let mut code = Code::new();
        let mut f = Function::new("f", Signature::new(VarType::Void, Vec::<(VarType, String)>::new()));
        f.bytecode.emit_with_u16(Op::LoadDVar, 0);
        f.bytecode.emit(Op::Return);
        code.add_function(f).unwrap();
        assert!(validate(&code).is_err());

        let mut code = Code::new();
        let mut g = Function::new("g", Signature::new(VarType::Void, Vec::<(VarType, String)>::new()));
        g.bytecode.emit_with_u16(Op::Call, 9);
        code.add_function(g).unwrap();
        assert!(validate(&code).unwrap_err().to_string().contains("unknown function id 9"));
    }
}
